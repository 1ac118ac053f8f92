use std::collections::HashSet;

use tracing::{debug, error};

use super::{Checked as _, HandlerResult, expect_ok, first_int, tokens};
use crate::{
    at::{response::AtResponse, timeout::AtTimeout, tok::Tokenizer},
    context::Context,
    env::RilError,
    modem::ModemModel,
    request::{NetworkInfo, NetworkStatus, Response, SignalStrength},
};

/// Radio technologies as numbered upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
enum RadioTech {
    Unknown = 0,
    Gprs = 1,
    Edge = 2,
    Umts = 3,
    Hsdpa = 9,
    Hsupa = 10,
    Hspa = 11,
    Lte = 14,
}

impl RadioTech {
    /// Maps the `<nw_type>` field of `#PSNT`.
    fn from_psnt(nw_type: i32, model: ModemModel) -> Self {
        match nw_type {
            0 => Self::Gprs,
            1 => Self::Edge,
            2 => Self::Umts,
            3 => Self::Hsdpa,
            4 if model.is_lte() => Self::Lte,
            _ => Self::Unknown,
        }
    }
}

/// Preferred network types as numbered upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredNetwork {
    GsmWcdma,
    GsmOnly,
    Wcdma,
    GsmWcdmaAuto,
    LteGsmWcdma,
    LteOnly,
    LteWcdma,
}

impl PreferredNetwork {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::GsmWcdma,
            1 => Self::GsmOnly,
            2 => Self::Wcdma,
            3 => Self::GsmWcdmaAuto,
            9 => Self::LteGsmWcdma,
            11 => Self::LteOnly,
            12 => Self::LteWcdma,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        match self {
            Self::GsmWcdma => 0,
            Self::GsmOnly => 1,
            Self::Wcdma => 2,
            Self::GsmWcdmaAuto => 3,
            Self::LteGsmWcdma => 9,
            Self::LteOnly => 11,
            Self::LteWcdma => 12,
        }
    }

    /// The `AT+WS46` selection for this type, if the model supports it.
    pub fn to_ws46(self, lte: bool) -> Option<i32> {
        use PreferredNetwork::*;

        match (self, lte) {
            (GsmWcdma | GsmWcdmaAuto, true) => Some(29),
            (LteOnly, true) => Some(28),
            (LteWcdma, true) => Some(31),
            (LteGsmWcdma, true) => Some(25),
            (GsmWcdma | GsmWcdmaAuto, false) => Some(25),
            (GsmOnly, _) => Some(12),
            (Wcdma, _) => Some(22),
            (LteOnly | LteWcdma | LteGsmWcdma, false) => None,
        }
    }

    pub fn from_ws46(ws46: i32, lte: bool) -> Option<Self> {
        Some(match (ws46, lte) {
            (29, true) => Self::GsmWcdmaAuto,
            (28, true) => Self::LteOnly,
            (31, true) => Self::LteWcdma,
            (25, true) => Self::LteGsmWcdma,
            (25, false) => Self::GsmWcdma,
            (12, _) => Self::GsmOnly,
            (22, _) => Self::Wcdma,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Registration {
    stat: i32,
    lac: Option<i32>,
    cid: Option<i32>,
}

impl Registration {
    const DENIED: i32 = 3;

    fn stat_only(stat: i32) -> Self {
        Self {
            stat,
            lac: None,
            cid: None,
        }
    }

    fn with_cell(stat: i32, tok: &mut Tokenizer<'_>) -> Result<Self, RilError> {
        Ok(Self {
            stat,
            lac: Some(tok.next_hex_int()?),
            cid: Some(tok.next_hex_int()?),
        })
    }
}

// Both the solicited (`n,stat,...`) and unsolicited (`stat,...`) shapes can
// show up, and the cell fields are only present when registered. The comma
// count tells them apart.

fn parse_creg(line: &str) -> Result<Registration, RilError> {
    let mut tok = tokens(line)?;
    match tok.remainder().matches(',').count() {
        0 => Ok(Registration::stat_only(tok.next_int()?)),
        1 => {
            let _n = tok.next_int()?;
            Ok(Registration::stat_only(tok.next_int()?))
        }
        2 => {
            let stat = tok.next_int()?;
            Registration::with_cell(stat, &mut tok)
        }
        3 => {
            // `n,stat,lac,cid` or `stat,lac,cid,act`; only the first is
            // accepted, recognised by `n` being 2.
            if tok.next_int()? != 2 {
                return Err(RilError::Parse(format!("ambiguous registration {line:?}")));
            }
            let stat = tok.next_int()?;
            if stat > 5 {
                return Err(RilError::Parse(format!("ambiguous registration {line:?}")));
            }
            Registration::with_cell(stat, &mut tok)
        }
        4 => {
            let _n = tok.next_int()?;
            let stat = tok.next_int()?;
            Registration::with_cell(stat, &mut tok)
        }
        _ => Err(RilError::Parse(format!("unexpected registration {line:?}"))),
    }
}

fn parse_cgreg(line: &str) -> Result<Registration, RilError> {
    let mut tok = tokens(line)?;
    match tok.remainder().matches(',').count() {
        0 => Ok(Registration::stat_only(tok.next_int()?)),
        1 => {
            let _n = tok.next_int()?;
            Ok(Registration::stat_only(tok.next_int()?))
        }
        2 | 4 => {
            let stat = tok.next_int()?;
            Registration::with_cell(stat, &mut tok)
        }
        3 | 5 => {
            let _n = tok.next_int()?;
            let stat = tok.next_int()?;
            Registration::with_cell(stat, &mut tok)
        }
        _ => Err(RilError::Parse(format!("unexpected registration {line:?}"))),
    }
}

fn hex(value: Option<i32>) -> Option<String> {
    value.map(|v| format!("{v:x}"))
}

/// Network reject cause from `#CEERNET`, -1 when unavailable.
fn network_reject_cause(ctx: &Context) -> i32 {
    ctx.singleline("AT#CEERNET", "#CEERNET:", AtTimeout::Normal)
        .checked()
        .and_then(|response| first_int(&response))
        .unwrap_or(-1)
}

fn radio_tech(ctx: &Context) -> Option<RadioTech> {
    let response = ctx
        .singleline("AT#PSNT?", "#PSNT:", AtTimeout::Normal)
        .checked()
        .ok()?;
    parse_psnt(&response, ctx.session.model())
}

fn parse_psnt(response: &AtResponse, model: ModemModel) -> Option<RadioTech> {
    let mut tok = response.tokens().ok()?;
    let _mode = tok.next_int().ok()?;
    let mut tech = RadioTech::from_psnt(tok.next_int().ok()?, model);

    // Optional `<hsupa>,<hsdpa>,<hspa>` availability flags.
    if let Ok(hsupa) = tok.next_int() {
        if hsupa == 1 {
            tech = RadioTech::Hsupa;
        }
        if tok.next_int().is_ok() && tok.next_int().is_ok_and(|hspa| hspa == 1) {
            tech = RadioTech::Hspa;
        }
    }

    Some(tech)
}

pub fn signal_strength(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT+CSQ", "+CSQ:", AtTimeout::Normal)
        .checked()?;
    let mut tok = response.tokens()?;

    Ok(Response::SignalStrength(SignalStrength {
        rssi: tok.next_int()?,
        bit_error_rate: tok.next_int()?,
    }))
}

pub fn voice_registration(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT+CREG?", "+CREG:", AtTimeout::Normal)
        .checked()?;
    let registration = parse_creg(response.line()?)?;

    let mut fields: Vec<Option<String>> = vec![None; 14];
    fields[0] = Some(format!("{:x}", registration.stat));
    fields[1] = hex(registration.lac);
    fields[2] = hex(registration.cid);
    if registration.stat == Registration::DENIED {
        fields[13] = Some(format!("{:x}", network_reject_cause(ctx)));
    }
    let tech = radio_tech(ctx).unwrap_or(RadioTech::Unknown);
    fields[3] = Some((tech as i32).to_string());
    fields[7] = Some("0".to_owned());

    Ok(Response::Strings(fields))
}

pub fn data_registration(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT+CGREG?", "+CGREG:", AtTimeout::Normal)
        .checked()?;
    let line = response.line()?;

    let registration = if ctx.session.model().is_lte() && ctx.session.quirks().cgreg_lte {
        if lte_registered(ctx) {
            // Early LTE firmware reports the EPS attach on +CEREG only.
            let patched = format!("{line},00");
            debug!("patched LTE registration: {patched}");
            parse_cgreg(&patched)?
        } else {
            parse_cgreg(line)?
        }
    } else {
        parse_cgreg(line)?
    };

    let reject_cause = if registration.stat == Registration::DENIED {
        network_reject_cause(ctx)
    } else {
        0
    };
    let tech = radio_tech(ctx).unwrap_or(RadioTech::Unknown);

    Ok(Response::Strings(vec![
        Some(format!("{:x}", registration.stat)),
        hex(registration.lac),
        hex(registration.cid),
        Some((tech as i32).to_string()),
        Some(reject_cause.to_string()),
        Some("1".to_owned()),
    ]))
}

fn lte_registered(ctx: &Context) -> bool {
    let Ok(response) = ctx
        .singleline("AT+CEREG?", "+CEREG:", AtTimeout::Normal)
        .checked()
    else {
        return false;
    };

    response
        .tokens()
        .ok()
        .and_then(|mut tok| {
            tok.next_int().ok()?;
            tok.next_int().ok()
        })
        .is_some_and(|stat| stat == 1)
}

pub fn operator(ctx: &Context) -> HandlerResult {
    let response = ctx
        .multiline(
            "AT+COPS=3,0;+COPS?;+COPS=3,0;+COPS?;+COPS=3,2;+COPS?",
            "+COPS:",
            AtTimeout::Cops,
        )
        .checked()?;
    if response.intermediates.len() != 3 {
        return Err(RilError::Parse(format!(
            "expected 3 operator lines, got {}",
            response.intermediates.len()
        )));
    }

    let mut names = Vec::with_capacity(3);
    for (i, line) in response.intermediates.iter().enumerate() {
        // The short name is not reported by the modem.
        if i == 1 {
            names.push(Some(String::new()));
            continue;
        }
        names.push(registered_operator(line)?);
    }

    Ok(Response::Strings(names))
}

/// The `<oper>` field of a `+COPS:` read; `None` while unregistered.
fn registered_operator(line: &str) -> Result<Option<String>, RilError> {
    let mut tok = tokens(line)?;
    let _mode = tok.next_int()?;
    if !tok.has_more() {
        return Ok(None);
    }
    let _format = tok.next_int()?;
    if !tok.has_more() {
        return Ok(None);
    }

    Ok(Some(tok.next_str()?.to_owned()))
}

pub fn selection_mode(ctx: &Context) -> HandlerResult {
    let mode = ctx
        .singleline("AT+COPS?", "+COPS:", AtTimeout::Cops)
        .checked()
        .and_then(|response| first_int(&response));
    if let Err(e) = &mode {
        error!("network selection mode query failed with the radio on: {e}");
    }

    Ok(Response::Int(mode?))
}

pub fn select_automatic(ctx: &Context) -> HandlerResult {
    expect_ok(ctx.command("AT+COPS=0", AtTimeout::Cops))
}

pub fn select_manual(ctx: &Context, numeric: &str) -> HandlerResult {
    let response = ctx
        .multiline(
            &format!("AT+COPS=1,2,\"{numeric}\";+COPS?"),
            "+COPS:",
            AtTimeout::Cops,
        )
        .checked()?;

    let registered = registered_operator(response.line()?)?;
    if registered.as_deref() != Some(numeric) {
        debug!(?registered, "manual selection of {numeric} did not register");
        return Err(RilError::GenericFailure);
    }

    Ok(Response::Empty)
}

/// Parses the `+COPS: (...),(...),,(modes),(formats)` scan result. Networks
/// are reported once, by first appearance of their numeric id.
pub fn parse_available_networks(line: &str) -> Result<Vec<NetworkInfo>, RilError> {
    let mut tok = tokens(line)?;
    let count = tok.bracket_count();
    if count == 0 {
        return Err(RilError::Parse(format!("no networks in {line:?}")));
    }

    let mut seen = HashSet::new();
    let mut networks = Vec::new();
    // The last two groups list the supported modes and formats.
    for _ in 0..count.saturating_sub(2) {
        let mut fields = Tokenizer::raw(tok.next_bracket()?);
        let status = fields.next_int()?;
        let long_name = fields.next_str()?.to_owned();
        let short_name = fields.next_str()?.to_owned();
        let numeric = fields.next_str()?.to_owned();

        if !seen.insert(numeric.clone()) {
            continue;
        }
        networks.push(NetworkInfo {
            long_name,
            short_name,
            numeric,
            status: NetworkStatus::from_cops(status),
        });
    }

    Ok(networks)
}

pub fn available_networks(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT+COPS=?", "+COPS:", AtTimeout::Cops)
        .checked()?;

    Ok(Response::Networks(parse_available_networks(response.line()?)?))
}

pub fn preferred_network(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT+WS46?", "+WS46:", AtTimeout::Normal)
        .checked()?;
    let ws46 = first_int(&response)?;

    PreferredNetwork::from_ws46(ws46, ctx.session.model().is_lte())
        .map(|preferred| Response::Int(preferred.code()))
        .ok_or_else(|| RilError::Parse(format!("unmapped network selection {ws46}")))
}

pub fn set_preferred_network(ctx: &Context, network_type: i32) -> HandlerResult {
    let ws46 = PreferredNetwork::from_code(network_type)
        .and_then(|preferred| preferred.to_ws46(ctx.session.model().is_lte()))
        .ok_or(RilError::ModeNotSupported)?;

    expect_ok(ctx.command(&format!("AT+WS46={ws46}"), AtTimeout::Normal))
}

pub fn voice_radio_tech(ctx: &Context) -> HandlerResult {
    radio_tech(ctx)
        .map(|tech| Response::Int(tech as i32))
        .ok_or(RilError::GenericFailure)
}

pub fn location_updates(ctx: &Context, enable: bool) -> HandlerResult {
    let mode = if enable { 2 } else { 1 };
    expect_ok(ctx.command(&format!("AT+CREG={mode}"), AtTimeout::Normal))
}

pub fn set_band_mode(ctx: &Context, mode: i32) -> HandlerResult {
    if mode != 0 {
        return Err(RilError::RequestNotSupported);
    }

    expect_ok(ctx.command("AT#AUTOBND=2", AtTimeout::Normal))
}
