//! Interpretation of unsolicited result codes.
//!
//! This runs on the channel's reader thread, which must never issue AT
//! commands. Anything needing the modem is turned into a [`Job`] for the
//! command thread.

use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    at::tok::Tokenizer,
    config::Timings,
    env::{SuppSvcNotification, Unsolicited},
    jobs::{Job, JobQueue},
    radio::RadioState,
    session::Session,
};

const PDP_DEACTIVATIONS: &[&str] = &[
    "+CGEV: ME DEACT",
    "+CGEV: ME DETACH",
    "+CGEV: NW DETACH",
    "+CGEV: NW DEACT",
];

const CALL_STATE_MARKERS: &[&str] = &["+CRING:", "RING", "NO CARRIER", "+CCWA", "+WIND:"];

/// What the bridge does in response to one unsolicited line.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Raise(Unsolicited),
    Defer(Job, Duration),
}

/// Maps one unsolicited line, and the PDU following SMS headers, onto the
/// events and deferred work it causes.
pub fn interpret(
    line: &str,
    pdu: Option<&str>,
    state: RadioState,
    timings: &Timings,
) -> Vec<Action> {
    // Upstream polls for the initial state once the radio becomes available.
    if state == RadioState::Unavailable {
        return Vec::new();
    }
    let network_changed = || {
        (state != RadioState::Off).then_some(Action::Raise(Unsolicited::VoiceNetworkStateChanged))
    };

    if line.starts_with("#NITZ:") {
        return nitz(line)
            .map(|time| Action::Raise(Unsolicited::NitzTimeReceived(time.to_owned())))
            .into_iter()
            .collect();
    }
    if CALL_STATE_MARKERS.iter().any(|m| line.starts_with(m)) {
        return vec![Action::Raise(Unsolicited::CallStateChanged)];
    }
    if line.starts_with("+CREG:") || line.starts_with("+CGREG:") {
        return network_changed()
            .into_iter()
            .chain([Action::Defer(Job::RefreshDataCallList, Duration::ZERO)])
            .collect();
    }
    if line.starts_with("+CMT:") || line.starts_with("+CDS:") {
        let Some(pdu) = pdu else {
            warn!("SMS notification {line:?} without PDU");
            return Vec::new();
        };
        let event = if line.starts_with("+CMT:") {
            Unsolicited::NewSms(pdu.to_owned())
        } else {
            Unsolicited::NewSmsStatusReport(pdu.to_owned())
        };
        return vec![Action::Raise(event)];
    }
    if PDP_DEACTIVATIONS.iter().any(|p| line.starts_with(p)) {
        // Give the context state time to settle before reading it back.
        return vec![Action::Defer(
            Job::RefreshDataCallList,
            timings.pdp_deactivation,
        )];
    }
    if line.starts_with("+CGEV:") {
        return vec![Action::Defer(Job::RefreshDataCallList, Duration::ZERO)];
    }
    if line.starts_with("#QSS:") {
        return vec![Action::Defer(Job::SimStatus(line.to_owned()), Duration::ZERO)];
    }
    if line.starts_with("#PSNT:") {
        return network_changed().into_iter().collect();
    }
    if line.starts_with("+CUSD:") {
        return ussd(line).map(Action::Raise).into_iter().collect();
    }
    if line.starts_with("+CSSI:") {
        return cssi(line).map(Action::Raise).into_iter().collect();
    }
    if line.starts_with("+CSSU:") {
        return cssu(line).map(Action::Raise).into_iter().collect();
    }

    debug!("ignoring unsolicited {line:?}");
    Vec::new()
}

/// `#NITZ: yy/MM/dd,hh:mm:ss+zz,d`: the time is what follows the blank.
fn nitz(line: &str) -> Option<&str> {
    let time = line
        .split_once(':')
        .and_then(|(_, rest)| rest.split_once(' '))
        .map(|(_, time)| time);
    if time.is_none() {
        warn!("invalid NITZ line {line:?}");
    }

    time
}

/// `+CUSD: <m>[,<str>,<dcs>]`.
fn ussd(line: &str) -> Option<Unsolicited> {
    let parsed = (|| {
        let mut tok = Tokenizer::start(line)?;
        let mode = tok.next_int()?;
        let message = match mode {
            0 | 1 => Some(tok.next_str()?.to_owned()),
            _ => None,
        };
        Ok::<_, crate::at::tok::TokenError>(Unsolicited::OnUssd {
            mode: mode.to_string(),
            message,
        })
    })();

    parsed
        .inspect_err(|e| warn!("invalid USSD line {line:?}: {e}"))
        .ok()
}

/// `+CSSI: <code>[,<index>]`, a mobile originated notification.
fn cssi(line: &str) -> Option<Unsolicited> {
    let mut tok = Tokenizer::start(line).ok()?;
    let Ok(code) = tok.next_int() else {
        warn!("invalid CSSI line {line:?}");
        return None;
    };
    let index = tok.next_int().unwrap_or_default();

    Some(Unsolicited::SuppSvcNotification(SuppSvcNotification {
        notification_type: 0,
        code,
        index,
        toa: 0,
        number: None,
    }))
}

/// `+CSSU: <code>[,<index>[,<number>,<type>]]`, a mobile terminated
/// notification. A number without its type drops the whole notification.
fn cssu(line: &str) -> Option<Unsolicited> {
    let mut tok = Tokenizer::start(line).ok()?;
    let Ok(code) = tok.next_int() else {
        warn!("invalid CSSU line {line:?}");
        return None;
    };
    let mut notification = SuppSvcNotification {
        notification_type: 1,
        code,
        index: 0,
        toa: 0,
        number: None,
    };

    let Ok(index) = tok.next_int() else {
        return Some(Unsolicited::SuppSvcNotification(notification));
    };
    notification.index = index;

    if let Ok(number) = tok.next_str() {
        let Ok(toa) = tok.next_int() else {
            warn!("CSSU with number but no type: {line:?}");
            return None;
        };
        notification.number = Some(number.to_owned());
        notification.toa = toa;
    }

    Some(Unsolicited::SuppSvcNotification(notification))
}

/// Applies [`interpret`] to the live session.
pub fn on_unsolicited(
    session: &Session,
    jobs: &JobQueue,
    timings: &Timings,
    line: &str,
    pdu: Option<&str>,
) {
    for action in interpret(line, pdu, session.radio_state(), timings) {
        match action {
            Action::Raise(event) => session.raise(event),
            Action::Defer(job, delay) => jobs.post_delayed(job, delay),
        }
    }
}
