//! State shared by everything that talks to one modem.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use secrecy::{ExposeSecret as _, SecretString};
use tracing::debug;

use crate::{
    env::{RilEnvironment, Unsolicited},
    modem::{ModemIdentity, ModemModel, Quirks},
    radio::{RadioState, RadioStateMachine},
    sync::lock,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum UiccType {
    #[default]
    Unknown,
    Sim,
    Usim,
}

/// APN configuration set with the initial attach request and reused when a
/// data call is set up without one.
#[derive(Debug)]
pub struct AttachConfig {
    pub apn: String,
    pub protocol: String,
    pub auth_type: i32,
    pub user: Option<String>,
    pub password: Option<SecretString>,
}

impl AttachConfig {
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|pw| pw.expose_secret().as_str())
    }
}

pub struct Session {
    env: Arc<dyn RilEnvironment>,
    radio: RadioStateMachine,
    identity: Mutex<Option<ModemIdentity>>,
    pin: Mutex<Option<SecretString>>,
    attach: Mutex<Option<AttachConfig>>,
    uicc: Mutex<UiccType>,
    sim_initialized: AtomicBool,
}

impl Session {
    pub fn new(env: Arc<dyn RilEnvironment>) -> Self {
        Self {
            env,
            radio: RadioStateMachine::default(),
            identity: Mutex::new(None),
            pin: Mutex::new(None),
            attach: Mutex::new(None),
            uicc: Mutex::new(UiccType::Unknown),
            sim_initialized: AtomicBool::new(false),
        }
    }

    pub fn env(&self) -> &dyn RilEnvironment {
        &*self.env
    }

    pub fn raise(&self, event: Unsolicited) {
        debug!(?event, "raising unsolicited event");
        self.env.raise_unsolicited(event);
    }

    pub fn radio(&self) -> &RadioStateMachine {
        &self.radio
    }

    pub fn radio_state(&self) -> RadioState {
        self.radio.current()
    }

    /// Changes the radio state, notifying upstream if it actually changed.
    pub fn set_radio_state(&self, state: RadioState) {
        if let Some(new) = self.radio.set(state) {
            self.raise(Unsolicited::RadioStateChanged(new));
        }
    }

    /// The channel opened as `generation` is gone: mark it closed and become
    /// unavailable.
    pub fn on_channel_lost(&self, generation: u64) {
        if let Some(new) = self.radio.mark_closed(generation) {
            self.raise(Unsolicited::RadioStateChanged(new));
        }
    }

    pub fn identity(&self) -> Option<ModemIdentity> {
        lock(&self.identity).clone()
    }

    pub fn set_identity(&self, identity: ModemIdentity) {
        *lock(&self.identity) = Some(identity);
    }

    pub fn model(&self) -> ModemModel {
        lock(&self.identity)
            .as_ref()
            .map(|id| id.model)
            .unwrap_or_default()
    }

    pub fn quirks(&self) -> Quirks {
        lock(&self.identity)
            .as_ref()
            .map(|id| id.quirks)
            .unwrap_or_default()
    }

    pub fn cached_pin(&self) -> Option<String> {
        lock(&self.pin)
            .as_ref()
            .map(|pin| pin.expose_secret().clone())
    }

    pub fn cache_pin(&self, pin: &str) {
        *lock(&self.pin) = Some(SecretString::new(pin.to_owned()));
    }

    /// Replaces the cached PIN only if one is cached already.
    pub fn update_cached_pin(&self, pin: &str) {
        let mut cached = lock(&self.pin);
        if cached.is_some() {
            *cached = Some(SecretString::new(pin.to_owned()));
        }
    }

    pub fn clear_pin(&self) {
        *lock(&self.pin) = None;
    }

    pub fn set_attach_config(&self, config: Option<AttachConfig>) {
        *lock(&self.attach) = config;
    }

    pub fn with_attach_config<R>(&self, f: impl FnOnce(&AttachConfig) -> R) -> Option<R> {
        lock(&self.attach).as_ref().map(f)
    }

    pub fn uicc_type(&self) -> UiccType {
        *lock(&self.uicc)
    }

    pub fn set_uicc_type(&self, uicc: UiccType) {
        *lock(&self.uicc) = uicc;
    }

    /// True exactly once per session: the first time the SIM became ready.
    pub fn first_sim_ready(&self) -> bool {
        !self.sim_initialized.swap(true, Ordering::SeqCst)
    }
}
