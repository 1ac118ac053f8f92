//! SIM card status, PIN handling and raw file access.

use derive_more::Display;
use tracing::{debug, info, warn};

use super::{Checked as _, HandlerResult, first_int, first_str, tokens};
use crate::{
    at::{response::CmeError, timeout::AtTimeout},
    context::Context,
    env::{RilError, Unsolicited},
    jobs::Job,
    radio::RadioState,
    request::{
        AppState, AppStatus, AppType, CardState, CardStatus, PersoSubstate, PinState,
        Response, SimIo, SimIoResponse,
    },
    session::UiccType,
};

const SW1_SUCCESS: i32 = 0x90;
const SW1_BYTES_LEFT: i32 = 0x61;
/// Upper bound on `61xx` follow-up reads of one SIM I/O request.
const MAX_REREADS: usize = 8;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SimStatus {
    Absent,
    NotReady,
    Ready,
    Pin,
    Puk,
    NetworkPerso,
}

impl SimStatus {
    fn app(self) -> Option<AppStatus> {
        let app = |app_state, perso_substate, pin1| AppStatus {
            app_type: AppType::Sim,
            app_state,
            perso_substate,
            pin1,
            pin2: PinState::Unknown,
        };

        Some(match self {
            Self::Absent => return None,
            Self::NotReady => app(AppState::Detected, PersoSubstate::Unknown, PinState::Unknown),
            Self::Ready => app(AppState::Ready, PersoSubstate::Ready, PinState::Unknown),
            Self::Pin => app(
                AppState::Pin,
                PersoSubstate::Unknown,
                PinState::EnabledNotVerified,
            ),
            Self::Puk => app(AppState::Puk, PersoSubstate::Unknown, PinState::EnabledBlocked),
            Self::NetworkPerso => app(
                AppState::SubscriptionPerso,
                PersoSubstate::SimNetwork,
                PinState::EnabledNotVerified,
            ),
        })
    }

    pub fn card_status(self, uicc: UiccType) -> CardStatus {
        let Some(mut app) = self.app() else {
            return CardStatus {
                card_state: CardState::Absent,
                universal_pin_state: PinState::Unknown,
                gsm_umts_subscription_app_index: -1,
                applications: Vec::new(),
            };
        };
        if uicc == UiccType::Usim {
            app.app_type = AppType::Usim;
        }

        CardStatus {
            card_state: CardState::Present,
            universal_pin_state: app.pin1,
            gsm_umts_subscription_app_index: 0,
            applications: vec![app],
        }
    }
}

/// Reads `AT+CPIN?`, entering the cached PIN if the card asks for one.
/// Any failure to talk to the modem reads as [`SimStatus::NotReady`].
pub fn get_sim_status(ctx: &Context) -> SimStatus {
    let response = match ctx.singleline("AT+CPIN?", "+CPIN:", AtTimeout::Cpin) {
        Ok(response) => response,
        Err(e) => {
            debug!("SIM status unknown: {e}");
            return SimStatus::NotReady;
        }
    };

    if !response.success {
        return match response.cme_error() {
            Some(CmeError::SimBusy) if ctx.session.model().is_lte() => SimStatus::Absent,
            Some(CmeError::SimNotInserted) => SimStatus::Absent,
            _ => SimStatus::NotReady,
        };
    }

    let Ok(value) = first_str(&response) else {
        return SimStatus::NotReady;
    };
    match value.as_str() {
        "READY" => SimStatus::Ready,
        "SIM PIN" => enter_cached_pin(ctx),
        "SIM PUK" => SimStatus::Puk,
        "PH-NET PIN" => SimStatus::NetworkPerso,
        other => {
            debug!("treating +CPIN: {other} as absent");
            SimStatus::Absent
        }
    }
}

fn enter_cached_pin(ctx: &Context) -> SimStatus {
    let Some(pin) = ctx.session.cached_pin() else {
        return SimStatus::Pin;
    };

    info!("entering cached SIM PIN");
    let entered = ctx
        .command(&format!("AT+CPIN=\"{pin}\""), AtTimeout::Cpwd)
        .checked();
    let status = match entered {
        Ok(_) => SimStatus::Ready,
        Err(e) => {
            warn!("cached SIM PIN rejected, forgetting it: {e}");
            ctx.session.clear_pin();
            SimStatus::Pin
        }
    };
    ctx.sleep(ctx.timings.pin_entry);

    status
}

/// USIM or plain SIM, from the FCP template of EF_AD. Cached once known.
fn uicc_type(ctx: &Context) -> UiccType {
    if matches!(
        ctx.session.radio_state(),
        RadioState::Off | RadioState::Unavailable
    ) {
        return UiccType::Unknown;
    }
    let cached = ctx.session.uicc_type();
    if cached != UiccType::Unknown {
        return cached;
    }

    let detected = ctx
        .singleline("AT+CRSM=192,28423,0,0,15", "+CRSM:", AtTimeout::Crsm)
        .checked()
        .and_then(|response| parse_crsm(response.line()?))
        .map(|io| match io.sw1 {
            SW1_SUCCESS | SW1_BYTES_LEFT
                if io.response.as_deref().is_some_and(|r| r.starts_with("62")) =>
            {
                UiccType::Usim
            }
            SW1_SUCCESS | SW1_BYTES_LEFT => UiccType::Sim,
            sw1 => {
                warn!("EF_AD read failed: {sw1:#X}, {:#X}", io.sw2);
                UiccType::Unknown
            }
        });

    match detected {
        Ok(uicc) => {
            debug!(?uicc, "detected UICC type");
            ctx.session.set_uicc_type(uicc);
            uicc
        }
        Err(e) => {
            debug!("UICC type unknown: {e}");
            UiccType::Unknown
        }
    }
}

pub fn card_status(ctx: &Context) -> HandlerResult {
    let status = get_sim_status(ctx);
    let uicc = if status == SimStatus::Absent {
        UiccType::Unknown
    } else {
        uicc_type(ctx)
    };
    debug!(%status, ?uicc, "card status");

    Ok(Response::CardStatus(status.card_status(uicc)))
}

/// The PIN entry and change operations, all funnelled through `AT+CPIN`
/// and `AT+CPWD`.
#[derive(Debug)]
pub enum PinOp {
    Pin { pin: String },
    Puk { puk: String, new_pin: String },
    Pin2 { pin2: String },
    Puk2 { puk2: String, new_pin2: String },
    ChangePin { old_pin: String, new_pin: String },
    ChangePin2 { old_pin2: String, new_pin2: String },
}

impl PinOp {
    fn command(&self) -> String {
        match self {
            Self::Pin { pin } => format!("AT+CPIN=\"{pin}\""),
            Self::Pin2 { pin2 } => format!("AT+CPIN=\"{pin2}\""),
            Self::Puk { puk, new_pin } => format!("AT+CPIN=\"{puk}\",\"{new_pin}\""),
            Self::Puk2 { puk2, new_pin2 } => format!("AT+CPIN=\"{puk2}\",\"{new_pin2}\""),
            Self::ChangePin { old_pin, new_pin } => {
                format!("AT+CPWD=\"SC\",\"{old_pin}\",\"{new_pin}\"")
            }
            Self::ChangePin2 { old_pin2, new_pin2 } => {
                format!("AT+CPWD=\"P2\",\"{old_pin2}\",\"{new_pin2}\"")
            }
        }
    }
}

/// Remaining attempts of the code the card asks for, from `AT#PCT`.
fn remaining_retries(ctx: &Context) -> Option<i32> {
    let response = ctx
        .singleline("AT#PCT", "#PCT:", AtTimeout::Normal)
        .checked()
        .ok()?;

    first_int(&response).ok()
}

pub fn enter_pin(ctx: &Context, op: PinOp) -> HandlerResult {
    let result = ctx.command(&op.command(), AtTimeout::Cpwd).checked();
    if let Err(e) = result {
        // Lost channel and timeouts are not a wrong password.
        if !matches!(e, RilError::CommandFailure { .. }) {
            return Err(e);
        }
        let retries = remaining_retries(ctx);
        warn!(?retries, "SIM rejected the code");
        return Err(RilError::PasswordIncorrect { retries });
    }

    match &op {
        PinOp::Pin { pin } => {
            ctx.session.cache_pin(pin);
            // Raised once this request has completed.
            ctx.jobs.post(Job::Raise(Unsolicited::SimStatusChanged));
        }
        PinOp::ChangePin { new_pin, .. } => ctx.session.update_cached_pin(new_pin),
        _ => {}
    }
    info!("SIM code accepted");

    Ok(Response::Empty)
}

/// Parses `+CRSM: <sw1>,<sw2>[,<response>]`.
fn parse_crsm(line: &str) -> Result<SimIoResponse, RilError> {
    let mut tok = tokens(line)?;
    let sw1 = tok.next_int()?;
    let sw2 = tok.next_int()?;
    let response = if tok.has_more() {
        Some(tok.next_str()?.to_owned())
    } else {
        None
    };

    Ok(SimIoResponse { sw1, sw2, response })
}

fn crsm_command(io: &SimIo) -> String {
    let SimIo {
        command,
        file_id,
        p1,
        p2,
        p3,
        ..
    } = io;
    match &io.data {
        Some(data) => format!("AT+CRSM={command},{file_id},{p1},{p2},{p3},\"{data}\""),
        None => format!("AT+CRSM={command},{file_id},{p1},{p2},{p3}"),
    }
}

pub fn sim_io(ctx: &Context, mut io: SimIo) -> HandlerResult {
    let reread = ctx.session.model().is_lte();

    for _ in 0..=MAX_REREADS {
        let response = ctx
            .singleline(&crsm_command(&io), "+CRSM:", AtTimeout::Crsm)
            .checked()
            .map_err(|_| RilError::GenericFailure)?;
        let result = parse_crsm(response.line()?)?;

        if reread && result.sw1 == SW1_BYTES_LEFT {
            debug!(bytes = result.sw2, "more SIM data to read, asking again");
            io.p3 += result.sw2;
            continue;
        }

        return Ok(Response::SimIo(result));
    }

    warn!("SIM kept reporting more data after {MAX_REREADS} reads");
    Err(RilError::GenericFailure)
}

pub fn imsi(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT#CIMI", "#CIMI:", AtTimeout::Normal)
        .checked()?;

    Ok(Response::String(first_str(&response)?))
}

pub fn query_facility_lock(
    ctx: &Context,
    facility: &str,
    password: Option<&str>,
    service_class: i32,
) -> HandlerResult {
    let command = match password.filter(|pw| !pw.is_empty()) {
        Some(password) => {
            format!("AT+CLCK=\"{facility}\",2,\"{password}\",{service_class}")
        }
        None => format!("AT+CLCK=\"{facility}\",2"),
    };
    let response = ctx.multiline(&command, "+CLCK:", AtTimeout::Clck)?;
    if !response.success {
        return match response.cme_error() {
            Some(CmeError::SimNotInserted) => {
                debug!(facility, "no SIM, reporting facility as unlocked");
                Ok(Response::Int(0))
            }
            cme => Err(RilError::CommandFailure { cme }),
        };
    }

    let mut services = 0;
    for line in &response.intermediates {
        let mut tok = tokens(line)?;
        if tok.next_int()? != 1 {
            continue;
        }
        services += if tok.has_more() {
            tok.next_int()?
        } else {
            service_class
        };
    }

    Ok(Response::Int(services))
}

pub fn set_facility_lock(
    ctx: &Context,
    facility: &str,
    lock: bool,
    password: &str,
    service_class: i32,
) -> HandlerResult {
    let lock = u8::from(lock);
    let command = match facility {
        "SC" | "FD" => format!("AT+CLCK=\"{facility}\",{lock},\"{password}\""),
        _ => format!("AT+CLCK=\"{facility}\",{lock},\"{password}\",{service_class}"),
    };
    ctx.command(&command, AtTimeout::Clck).checked()?;

    Ok(Response::Int(-1))
}
