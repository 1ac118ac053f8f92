//! Mobile equipment control: RF power, identities and shutdown.

use tracing::{info, warn};

use super::{Checked as _, HandlerResult, first_int, first_str};
use crate::{
    at::timeout::AtTimeout, context::Context, env::RilError, radio::RadioState,
    request::Response,
};

const NOT_AVAILABLE: &str = "----";

pub fn radio_power(ctx: &Context, on: bool) -> HandlerResult {
    let previous = ctx.session.radio_state();

    if !on && previous != RadioState::Off {
        ctx.session.set_radio_state(RadioState::Off);
        if let Err(e) = ctx.command("AT+CFUN=4", AtTimeout::Cfun).checked() {
            warn!("failed to switch RF off: {e}");
            ctx.session.set_radio_state(previous);
            return Err(e);
        }
        info!("RF switched off");
    } else if on && previous == RadioState::Off {
        if let Err(e) = ctx.command("AT+CFUN=1", AtTimeout::Cfun).checked() {
            // The command sometimes fails although the RF came up anyway.
            if !rf_enabled(ctx)? {
                warn!("failed to switch RF on: {e}");
                return Err(e);
            }
        }
        ctx.session.set_radio_state(RadioState::On);
        info!("RF switched on");
    }
    ctx.sleep(ctx.timings.radio_power);

    Ok(Response::Empty)
}

fn rf_enabled(ctx: &Context) -> Result<bool, RilError> {
    let response = ctx
        .singleline("AT+CFUN?", "+CFUN:", AtTimeout::Cfun)
        .checked()?;

    Ok(first_int(&response)? == 1)
}

pub fn imei(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT#CGSN", "#CGSN:", AtTimeout::Normal)
        .checked()?;

    Ok(Response::String(first_str(&response)?))
}

pub fn imei_sv(ctx: &Context) -> HandlerResult {
    let svn = if ctx.session.model().is_lte() {
        let response = ctx
            .singleline("AT+IMEISV", "+IMEISV:", AtTimeout::Normal)
            .checked()?;
        first_str(&response)?
    } else {
        let response = ctx.numeric("AT+IMEISV", AtTimeout::Normal).checked()?;
        response.line()?.to_owned()
    };

    Ok(Response::String(svn))
}

/// IMEI followed by placeholders for the IMEISV, ESN and MEID slots.
pub fn device_identity(ctx: &Context) -> HandlerResult {
    let response = ctx.numeric("AT+CGSN", AtTimeout::Normal).checked()?;
    let imei = response.line()?.to_owned();

    let mut identity = vec![Some(imei)];
    identity.extend([NOT_AVAILABLE; 3].map(|slot| Some(slot.to_owned())));

    Ok(Response::Strings(identity))
}

pub fn baseband_version(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT#CGMR", "#CGMR:", AtTimeout::Normal)
        .checked()?;

    Ok(Response::String(first_str(&response)?))
}

/// Powers the module down. The radio is gone afterwards whatever the modem
/// answered, and the request always succeeds.
pub fn shutdown(ctx: &Context) -> HandlerResult {
    if let Err(e) = ctx.command("AT#SHDN", AtTimeout::Normal).checked() {
        warn!("shutdown command failed: {e}");
    }
    ctx.session.set_radio_state(RadioState::Unavailable);
    info!("modem shut down");

    Ok(Response::Empty)
}
