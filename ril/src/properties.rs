//! Property style service control, used to drive the DHCP helper of the
//! data interface and to publish values such as the emergency numbers.

use std::{collections::HashMap, process::Command, sync::Mutex};

use eyre::{Result, WrapErr as _, eyre};
use tracing::{info, warn};

use crate::sync::lock;

pub const CTL_START: &str = "ctl.start";
pub const CTL_STOP: &str = "ctl.stop";
pub const ECC_LIST: &str = "ro.ril.ecclist";

/// Acquires an address on the data interface.
pub const DHCP_SERVICE: &str = "dhcpcd_wwan0";
/// Flushes the data interface configuration.
pub const CLEAN_SERVICE: &str = "clean_wwan0";

pub trait Properties: Send + Sync {
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

pub fn start_service(props: &dyn Properties, service: &str) {
    if let Err(e) = props.set(CTL_START, service) {
        warn!("failed to start {service}: {e:?}");
    }
}

pub fn stop_service(props: &dyn Properties, service: &str) {
    if let Err(e) = props.set(CTL_STOP, service) {
        warn!("failed to stop {service}: {e:?}");
    }
}

/// Maps `ctl.start`/`ctl.stop` onto systemd units and keeps every other
/// property in memory.
#[derive(Debug, Default)]
pub struct SystemdProperties {
    values: Mutex<HashMap<String, String>>,
}

impl SystemdProperties {
    pub fn get(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    fn systemctl(action: &str, service: &str) -> Result<()> {
        let unit = format!("{service}.service");
        let output = Command::new("systemctl")
            .args([action, &unit])
            .output()
            .wrap_err_with(|| format!("failed to run systemctl {action} {unit}"))?;

        if output.status.success() {
            Ok(())
        } else {
            let err = String::from_utf8_lossy(&output.stderr);
            Err(eyre!("systemctl {action} {unit} failed: {err}"))
        }
    }
}

impl Properties for SystemdProperties {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        match key {
            CTL_START => Self::systemctl("start", value),
            CTL_STOP => Self::systemctl("stop", value),
            _ => {
                info!("property {key} = {value}");
                lock(&self.values).insert(key.to_owned(), value.to_owned());
                Ok(())
            }
        }
    }
}
