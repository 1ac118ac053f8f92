//! Screen state driven power saving.
//!
//! With the screen off the modem stops reporting cell level registration
//! changes, NITZ, supplementary service and technology changes, and the
//! module may enter its power saving mode. The command batches run under a
//! kernel wake lock so the host does not suspend half way.

use std::{fs::OpenOptions, io::Write as _};

use eyre::{Result, WrapErr as _};
use tracing::{debug, info, warn};

use super::HandlerResult;
use crate::{
    at::timeout::AtTimeout, config::WakeLock, context::Context, env::RilError,
    request::Response,
};

const SCREEN_OFF: &str = "AT+CREG=1;+CGREG=1;#NITZ=0,0;+CSSN=0,0;#PSNT=0;+CFUN=5";
const SCREEN_ON: [&str; 5] = [
    "AT+CFUN=1",
    "AT+CREG=2;+CGREG=2",
    "AT#NITZ=9,1",
    "AT+CSSN=1,1",
    "AT#PSNT=1",
];

struct WakeLockGuard<'a>(&'a WakeLock);

impl<'a> WakeLockGuard<'a> {
    fn acquire(wake_lock: &'a WakeLock) -> Self {
        match write_name(&wake_lock.lock_path) {
            Ok(()) => debug!("wake lock acquired"),
            Err(e) => warn!("failed to acquire wake lock: {e:?}"),
        }
        Self(wake_lock)
    }
}

impl Drop for WakeLockGuard<'_> {
    fn drop(&mut self) {
        match write_name(&self.0.unlock_path) {
            Ok(()) => debug!("wake lock released"),
            Err(e) => warn!("failed to release wake lock: {e:?}"),
        }
    }
}

fn write_name(path: &std::path::Path) -> Result<()> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|mut file| file.write_all(WakeLock::NAME.as_bytes()))
        .wrap_err_with(|| format!("failed to write {}", path.display()))
}

pub fn screen_state(ctx: &Context, on: bool) -> HandlerResult {
    let Some(wake_lock) = &ctx.wake_lock else {
        debug!("power management disabled, ignoring screen state");
        return Ok(Response::Empty);
    };
    let _guard = WakeLockGuard::acquire(wake_lock);

    // Only a broken channel fails the request; the modem may reject parts of
    // the batch depending on firmware.
    let mut failure: Option<RilError> = None;
    let mut run = |command: &str| {
        if let Err(e) = ctx.command(command, AtTimeout::Normal) {
            failure.get_or_insert(e.into());
        }
    };

    if on {
        ctx.sleep(ctx.timings.screen_on);
        SCREEN_ON.into_iter().for_each(&mut run);
    } else {
        run(SCREEN_OFF);
        ctx.sleep(ctx.timings.screen_off);
    }
    info!(on, "screen state applied");

    failure.map_or(Ok(Response::Empty), Err)
}
