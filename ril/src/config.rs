use std::{path::PathBuf, time::Duration};

use bon::Builder;

/// Fixed delays of the bring-up and request handling paths.
///
/// The defaults are what the modules need in practice; the settle delays in
/// particular were found empirically and shorter values make the modem drop
/// commands.
#[derive(Debug, Clone, Builder)]
pub struct Timings {
    /// After `AT+CFUN=4` during bring-up.
    #[builder(default = Duration::from_secs(4))]
    pub settle: Duration,
    /// After switching RF on or off.
    #[builder(default = Duration::from_secs(4))]
    pub radio_power: Duration,
    /// After the cached PIN was entered automatically.
    #[builder(default = Duration::from_secs(2))]
    pub pin_entry: Duration,
    /// After tearing down an existing ECM session.
    #[builder(default = Duration::from_secs(1))]
    pub ecm_teardown: Duration,
    /// After (re)starting the DHCP helper.
    #[builder(default = Duration::from_secs(1))]
    pub dhcp_helper: Duration,
    /// Around the screen state command batches.
    #[builder(default = Duration::from_secs(2))]
    pub screen_off: Duration,
    #[builder(default = Duration::from_secs(1))]
    pub screen_on: Duration,
    /// Between attempts to reopen the channel endpoint.
    #[builder(default = Duration::from_secs(10))]
    pub reopen_backoff: Duration,
    #[builder(default = Duration::from_millis(500))]
    pub call_state_repoll: Duration,
    /// Before re-reading the data call list after a PDP deactivation.
    #[builder(default = Duration::from_secs(2))]
    pub pdp_deactivation: Duration,
    #[builder(default = Duration::from_millis(250))]
    pub handshake: Duration,
    /// Caps every per command timeout, for simulated modems.
    pub at_timeout_override: Option<Duration>,
}

impl Default for Timings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Timings {
    /// No delays at all and a short command timeout.
    pub fn immediate(at_timeout: Duration) -> Self {
        Self::builder()
            .settle(Duration::ZERO)
            .radio_power(Duration::ZERO)
            .pin_entry(Duration::ZERO)
            .ecm_teardown(Duration::ZERO)
            .dhcp_helper(Duration::ZERO)
            .screen_off(Duration::ZERO)
            .screen_on(Duration::ZERO)
            .reopen_backoff(Duration::from_millis(50))
            .call_state_repoll(Duration::from_millis(50))
            .pdp_deactivation(Duration::from_millis(50))
            .handshake(Duration::from_millis(50))
            .at_timeout_override(at_timeout)
            .build()
    }
}

/// Paths of the kernel wake lock interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeLock {
    pub lock_path: PathBuf,
    pub unlock_path: PathBuf,
}

impl WakeLock {
    pub const NAME: &'static str = "orb-ril";

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            lock_path: dir.join("wake_lock"),
            unlock_path: dir.join("wake_unlock"),
        }
    }

    /// Power management is only used when both files are writable.
    pub fn is_available(&self) -> bool {
        [&self.lock_path, &self.unlock_path].iter().all(|path| {
            std::fs::OpenOptions::new().write(true).open(path).is_ok()
        })
    }
}
