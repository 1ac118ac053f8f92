use std::io;

use thiserror::Error;

use super::tok::{TokenError, Tokenizer};

const FINAL_SUCCESSES: &[&str] = &["OK", "CONNECT"];

const FINAL_ERRORS: &[&str] = &[
    "ERROR",
    "+CMS ERROR:",
    "+CME ERROR:",
    "NO CARRIER",
    "NO ANSWER",
    "NO DIALTONE",
];

/// Unsolicited headers whose next line is a PDU belonging to them.
const SMS_UNSOLICITED: &[&str] = &["+CMT:", "+CDS:", "+CBM:"];

pub fn is_final_success(line: &str) -> bool {
    FINAL_SUCCESSES.iter().any(|p| line.starts_with(p))
}

pub fn is_final_error(line: &str) -> bool {
    FINAL_ERRORS.iter().any(|p| line.starts_with(p))
}

pub fn is_sms_unsolicited(line: &str) -> bool {
    SMS_UNSOLICITED.iter().any(|p| line.starts_with(p))
}

#[derive(Debug, Error)]
pub enum AtError {
    #[error("timed out waiting for the final response")]
    Timeout,
    #[error("AT channel closed")]
    ChannelClosed,
    #[error("another AT command is already in flight")]
    CommandInFlight,
    #[error("response is missing its intermediate line")]
    InvalidResponse,
    #[error(transparent)]
    Parse(#[from] TokenError),
    #[error("channel i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Mobile equipment error reported with `+CME ERROR: <n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmeError {
    OperationNotAllowed,
    SimNotInserted,
    SimPinRequired,
    SimPukRequired,
    SimBusy,
    IncorrectPassword,
    Other(i32),
}

impl From<i32> for CmeError {
    fn from(code: i32) -> Self {
        match code {
            3 => Self::OperationNotAllowed,
            10 => Self::SimNotInserted,
            11 => Self::SimPinRequired,
            12 => Self::SimPukRequired,
            14 => Self::SimBusy,
            16 => Self::IncorrectPassword,
            other => Self::Other(other),
        }
    }
}

/// Everything the modem said in reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtResponse {
    pub success: bool,
    pub final_response: String,
    pub intermediates: Vec<String>,
}

impl AtResponse {
    /// The first intermediate line, as returned by single-line and numeric
    /// commands.
    pub fn line(&self) -> Result<&str, AtError> {
        self.intermediates
            .first()
            .map(String::as_str)
            .ok_or(AtError::InvalidResponse)
    }

    /// Tokenizer positioned after the prefix of the first intermediate line.
    pub fn tokens(&self) -> Result<Tokenizer<'_>, AtError> {
        Ok(Tokenizer::start(self.line()?)?)
    }

    /// `None` on success or when the failure was not a `+CME ERROR:`.
    pub fn cme_error(&self) -> Option<CmeError> {
        if self.success {
            return None;
        }
        let code = self.final_response.strip_prefix("+CME ERROR:")?;

        Tokenizer::raw(code).next_int().ok().map(CmeError::from)
    }
}
