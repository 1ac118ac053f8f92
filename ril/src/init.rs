//! Modem bring-up and the SIM driven second stage of it.

use tracing::{debug, info, warn};

use crate::{
    at::{response::AtError, timeout::AtTimeout, tok::Tokenizer},
    context::Context,
    env::{RilError, Unsolicited},
    modem::{ModemIdentity, ModemModel},
    properties::ECC_LIST,
    radio::RadioState,
    requests::{self, Checked as _},
    session::UiccType,
};

/// Always dialable, whatever the SIM says.
const COMMON_EMERGENCY_NUMBERS: &str = "112,911";

/// Sends `command` ignoring what the modem answers. Only a lost channel or a
/// timeout stops the sequence.
fn send(ctx: &Context, command: &str, timeout: AtTimeout) -> Result<bool, AtError> {
    let response = ctx.command(command, timeout)?;
    if !response.success {
        debug!("{command} failed with {}", response.final_response);
    }

    Ok(response.success)
}

/// Runs on every freshly opened channel. Leaves the radio OFF.
pub fn initialize(ctx: &Context) {
    info!("initializing modem");
    match bring_up(ctx) {
        Ok(()) => info!("modem initialized"),
        Err(e) => warn!("bring-up aborted: {e}"),
    }
}

fn bring_up(ctx: &Context) -> Result<(), AtError> {
    ctx.session.set_radio_state(RadioState::Unavailable);

    match ctx.channel()?.handshake(ctx.timings.handshake) {
        // A modem that stays silent gets noticed by the first real timeout.
        Err(AtError::Timeout) => warn!("handshake unanswered, carrying on"),
        other => other?,
    }
    probe(ctx);

    send(ctx, "ATE0", AtTimeout::Normal)?;
    // Echo is tolerated, verbose result codes are required.
    send(ctx, "ATE0Q0V1", AtTimeout::Normal)?;
    send(ctx, "AT#QSS=2", AtTimeout::Normal)?;
    send(ctx, "AT+CGATT=1", AtTimeout::Cgatt)?;

    send(ctx, "AT+CFUN=4", AtTimeout::Cfun)?;
    ctx.session.set_radio_state(RadioState::Off);
    // Shorter waits between CFUN changes make the modem drop commands.
    ctx.sleep(ctx.timings.settle);

    send(ctx, "AT&W", AtTimeout::Normal)?;
    send(ctx, "AT&P", AtTimeout::Normal)?;
    send(ctx, "ATS0=0", AtTimeout::Normal)?;
    send(ctx, "AT+CMEE=1", AtTimeout::Normal)?;
    if !send(ctx, "AT+CREG=2", AtTimeout::Normal)? {
        send(ctx, "AT+CREG=1", AtTimeout::Normal)?;
    }
    send(ctx, "AT+CGREG=2", AtTimeout::Normal)?;

    if matches!(ctx.session.model(), ModemModel::He910 | ModemModel::Ue910) {
        send(ctx, "AT+CMUT=0", AtTimeout::Normal)?;
        send(ctx, "AT+WIND=32", AtTimeout::Normal)?;
    }

    Ok(())
}

/// Identifies model and firmware. On failure the session keeps assuming an
/// HE910 without quirks.
fn probe(ctx: &Context) {
    let query = |command: &str, prefix: &str| -> Result<String, RilError> {
        let response = ctx
            .singleline(command, prefix, AtTimeout::Normal)
            .checked()?;
        requests::first_str(&response)
    };

    let identity = query("AT#CGMR", "#CGMR:").and_then(|firmware| {
        let model = query("AT#CGMM", "#CGMM:")?;
        Ok(ModemIdentity::identify(&model, &firmware))
    });
    match identity {
        Ok(identity) => ctx.session.set_identity(identity),
        Err(e) => warn!("failed to identify modem: {e}"),
    }
}

/// Acts on a `#QSS: <status>` line. Status 2 means the SIM is ready.
pub fn on_sim_status(ctx: &Context, line: &str) {
    let status = Tokenizer::start(line).and_then(|mut tok| tok.next_int());
    match status {
        Ok(0) => {
            info!("SIM removed");
            ctx.session.set_uicc_type(UiccType::Unknown);
        }
        Ok(2) => {
            info!("SIM ready");
            if let Err(e) = on_sim_ready(ctx) {
                warn!("SIM ready setup failed: {e}");
            } else if ctx.session.first_sim_ready() {
                if let Err(e) = finalize(ctx) {
                    warn!("final initialization failed: {e}");
                }
            }
        }
        Ok(other) => debug!("SIM status {other}"),
        Err(e) => warn!("invalid SIM status line {line:?}: {e}"),
    }

    ctx.session.raise(Unsolicited::SimStatusChanged);
}

fn on_sim_ready(ctx: &Context) -> Result<(), AtError> {
    send(ctx, "AT#PSNT=1", AtTimeout::Normal)?;
    send(ctx, "AT+CSMS=1", AtTimeout::Normal)?;
    // Route SMS, cell broadcasts and status reports straight to us.
    send(ctx, "AT+CNMI=2,2,2,1,1", AtTimeout::Normal)?;

    Ok(())
}

/// Configuration that needs a SIM, done once per bridge lifetime.
fn finalize(ctx: &Context) -> Result<(), AtError> {
    send(ctx, "AT+CSCS=\"UCS2\"", AtTimeout::Normal)?;
    send(ctx, "AT+CCWA=1", AtTimeout::Ccwa)?;
    for command in [
        "AT+COLP=0",
        "AT#NITZ=9,1",
        "AT+CUSD=1",
        "AT+CSSN=1,1",
        "AT+CGEREP=1,0",
        "AT#DIALMODE=0",
        "AT+CMGF=0",
    ] {
        send(ctx, command, AtTimeout::Normal)?;
    }

    ctx.session.raise(Unsolicited::VoiceNetworkStateChanged);
    publish_emergency_numbers(ctx);

    Ok(())
}

/// Parses `+CPBR: (<first>-<last>),<nlength>,<tlength>`.
fn parse_phonebook_range(line: &str) -> Option<(i32, i32)> {
    let mut tok = Tokenizer::start(line).ok()?;
    let range = tok.next_str().ok()?;
    let (first, last) = range.trim().strip_prefix('(')?.split_once('-')?;
    let mut first = Tokenizer::raw(first);
    let mut last = Tokenizer::raw(last);

    Some((first.next_int().ok()?, last.next_int().ok()?))
}

fn read_emergency_phonebook(ctx: &Context) -> Result<String, RilError> {
    ctx.command("AT+CPBS=\"EC\"", AtTimeout::Cpbs).checked()?;
    let response = ctx
        .singleline("AT+CPBR=?", "+CPBR:", AtTimeout::Cpbr)
        .checked()?;
    let line = response.line()?;
    let (first, last) = parse_phonebook_range(line)
        .ok_or_else(|| RilError::Parse(format!("bad phonebook range {line:?}")))?;
    if last <= first {
        return Err(RilError::Parse(format!("empty phonebook range {first}-{last}")));
    }

    let mut numbers: Vec<String> = COMMON_EMERGENCY_NUMBERS
        .split(',')
        .map(str::to_owned)
        .collect();
    for index in first..=last {
        let entry = ctx
            .singleline(&format!("AT+CPBR={index}"), "+CPBR:", AtTimeout::Cpbr)
            .checked()
            .and_then(|response| {
                let mut tok = requests::tokens(response.line()?)?;
                let _index = tok.next_int()?;
                Ok(tok.next_str()?.to_owned())
            });
        // Whole-number match, so "11" is kept although "112" is listed.
        match entry {
            Ok(number) if !number.is_empty() && !numbers.contains(&number) => {
                numbers.push(number);
            }
            Ok(_) => {}
            Err(RilError::ChannelClosed) => return Err(RilError::ChannelClosed),
            Err(e) => debug!(index, "skipping emergency phonebook entry: {e}"),
        }
    }

    Ok(numbers.join(","))
}

/// Publishes the emergency numbers, from the SIM when it has any.
fn publish_emergency_numbers(ctx: &Context) {
    let numbers = read_emergency_phonebook(ctx).unwrap_or_else(|e| {
        warn!("using common emergency numbers: {e}");
        COMMON_EMERGENCY_NUMBERS.to_owned()
    });
    info!(%numbers, "emergency numbers");
    if let Err(e) = ctx.properties.set(ECC_LIST, &numbers) {
        warn!("failed to publish emergency numbers: {e:?}");
    }

    if let Err(e) = ctx.command("AT+CPBS=\"SM\"", AtTimeout::Cpbs) {
        debug!("failed to select SIM phonebook: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phonebook_range() {
        assert_eq!(parse_phonebook_range("+CPBR: (1-10),20,18"), Some((1, 10)));
        assert_eq!(parse_phonebook_range("+CPBR: (1-1),20,18"), Some((1, 1)));
        assert_eq!(parse_phonebook_range("+CPBR: 20,18"), None);
        assert_eq!(parse_phonebook_range("+CPBR: (x-3)"), None);
    }
}
