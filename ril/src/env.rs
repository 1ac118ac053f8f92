//! The boundary towards the telephony stack.

use serde::Serialize;
use thiserror::Error;

use crate::{
    at::{
        response::{AtError, CmeError},
        tok::TokenError,
    },
    radio::RadioState,
    request::{DataCall, Response},
};

/// Opaque handle tying a completion to its request.
pub type Token = u64;

#[derive(Debug, Error)]
pub enum RilError {
    #[error("radio not available")]
    RadioNotAvailable,
    #[error("modem rejected the command (cme: {cme:?})")]
    CommandFailure { cme: Option<CmeError> },
    #[error("modem did not answer in time")]
    Timeout,
    #[error("AT channel closed")]
    ChannelClosed,
    #[error("unexpected response: {0}")]
    Parse(String),
    #[error("password incorrect, {retries:?} retries left")]
    PasswordIncorrect { retries: Option<i32> },
    #[error("request not supported")]
    RequestNotSupported,
    #[error("mode not supported")]
    ModeNotSupported,
    #[error("generic failure")]
    GenericFailure,
}

impl RilError {
    /// The numeric error code reported upstream.
    pub fn code(&self) -> i32 {
        match self {
            Self::RadioNotAvailable => 1,
            Self::PasswordIncorrect { .. } => 3,
            Self::RequestNotSupported => 6,
            Self::ModeNotSupported => 13,
            Self::CommandFailure { .. }
            | Self::Timeout
            | Self::ChannelClosed
            | Self::Parse(_)
            | Self::GenericFailure => 2,
        }
    }
}

impl From<AtError> for RilError {
    fn from(value: AtError) -> Self {
        match value {
            AtError::Timeout => Self::Timeout,
            AtError::ChannelClosed | AtError::Io(_) => Self::ChannelClosed,
            AtError::InvalidResponse => Self::Parse(value.to_string()),
            AtError::Parse(e) => Self::Parse(e.to_string()),
            AtError::CommandInFlight => Self::GenericFailure,
        }
    }
}

impl From<TokenError> for RilError {
    fn from(value: TokenError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuppSvcNotification {
    /// 0 for mobile originated (`+CSSI`), 1 for mobile terminated (`+CSSU`).
    pub notification_type: i32,
    pub code: i32,
    pub index: i32,
    pub toa: i32,
    pub number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Unsolicited {
    RadioStateChanged(RadioState),
    CallStateChanged,
    VoiceNetworkStateChanged,
    NitzTimeReceived(String),
    NewSms(String),
    NewSmsStatusReport(String),
    /// Empty when no data call is up.
    DataCallListChanged(Vec<DataCall>),
    SimStatusChanged,
    OnUssd { mode: String, message: Option<String> },
    SuppSvcNotification(SuppSvcNotification),
}

/// Callbacks into the telephony stack.
pub trait RilEnvironment: Send + Sync {
    /// Called exactly once per request.
    fn complete_request(&self, token: Token, result: Result<Response, RilError>);

    fn raise_unsolicited(&self, event: Unsolicited);
}
