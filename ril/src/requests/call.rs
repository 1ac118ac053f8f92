//! Voice call control.
//!
//! Call control completion codes are unreliable across firmware revisions,
//! so dial, hangup and the `+CHLD` family report success whenever the modem
//! answered at all. The telephony stack learns the real outcome from the
//! next `AT+CLCC` poll.

use tracing::{debug, warn};

use super::{Checked as _, HandlerResult, expect_ok, first_int, tokens};
use crate::{
    at::{
        response::{AtError, AtResponse, CmeError},
        timeout::AtTimeout,
    },
    context::Context,
    env::RilError,
    jobs::Job,
    request::{Call, CallForward, CallState, Clir, Response},
};

const DIALABLE: &[char] = &['+', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];

fn advisory(result: Result<AtResponse, AtError>) -> HandlerResult {
    let response = result?;
    if !response.success {
        debug!(
            "ignoring call control failure {:?}, next call poll will tell",
            response.final_response
        );
    }

    Ok(Response::Empty)
}

/// Parses one `+CLCC: index,isMT,state,mode,mpty[,number,toa]` line.
pub fn parse_clcc(line: &str) -> Result<Call, RilError> {
    let mut tok = tokens(line)?;
    let index = tok.next_int()?;
    let is_mt = tok.next_bool()?;
    let state = tok.next_int()?;
    let state = CallState::from_clcc(state)
        .ok_or_else(|| RilError::Parse(format!("unknown call state {state}")))?;
    let is_voice = tok.next_int()? == 0;
    let is_multiparty = tok.next_bool()?;

    let mut call = Call {
        index,
        is_mt,
        state,
        is_voice,
        is_multiparty,
        number: None,
        toa: 0,
    };
    if tok.has_more() {
        let Ok(number) = tok.next_str() else {
            return Ok(call);
        };
        // Some firmware reports "NOT AVAILABLE" instead of a number.
        if number.starts_with(DIALABLE) {
            call.number = Some(number.to_owned());
        }
        call.toa = tok.next_int()?;
    }

    Ok(call)
}

pub fn current_calls(ctx: &Context) -> HandlerResult {
    let response = ctx.multiline("AT+CLCC", "+CLCC:", AtTimeout::Normal)?;
    if !response.success {
        return match response.cme_error() {
            Some(
                CmeError::SimNotInserted
                | CmeError::OperationNotAllowed
                | CmeError::SimPinRequired
                | CmeError::SimPukRequired,
            ) => {
                // +CLCC keeps failing without a usable SIM; report no calls
                // so the stack stops asking.
                warn!("call list unavailable, SIM missing or locked");
                Ok(Response::Calls(Vec::new()))
            }
            cme => Err(RilError::CommandFailure { cme }),
        };
    }

    let calls: Vec<Call> = response
        .intermediates
        .iter()
        .filter_map(|line| match parse_clcc(line) {
            Ok(call) => Some(call),
            Err(e) => {
                debug!("skipping call line {line:?}: {e}");
                None
            }
        })
        .collect();

    if calls.iter().any(|call| !call.state.is_settled()) {
        ctx.jobs
            .post_delayed(Job::PollCallState, ctx.timings.call_state_repoll);
    }

    Ok(Response::Calls(calls))
}

pub fn dial(ctx: &Context, address: &str, clir: Clir) -> HandlerResult {
    let clir = match clir {
        Clir::Invocation => "I",
        Clir::Suppression => "i",
        Clir::Subscription => "",
    };

    advisory(ctx.command(&format!("ATD{address}{clir};"), AtTimeout::Dial))
}

pub fn hangup(ctx: &Context, index: i32) -> HandlerResult {
    advisory(ctx.command(&format!("AT+CHLD=1{index}"), AtTimeout::Chld))
}

/// Hold, release and conference operations of 3GPP 22.030 6.5.5.
pub fn chld(ctx: &Context, command: &str) -> HandlerResult {
    advisory(ctx.command(command, AtTimeout::Chld))
}

pub fn udub(ctx: &Context) -> HandlerResult {
    advisory(ctx.command("AT#UDUB", AtTimeout::Normal))
}

pub fn answer(ctx: &Context) -> HandlerResult {
    advisory(ctx.command("ATA", AtTimeout::Answer))
}

pub fn separate_connection(ctx: &Context, party: i32) -> HandlerResult {
    if !(1..10).contains(&party) {
        return Err(RilError::GenericFailure);
    }

    advisory(ctx.command(&format!("AT+CHLD=2{party}"), AtTimeout::Chld))
}

pub fn explicit_transfer(ctx: &Context) -> HandlerResult {
    expect_ok(ctx.command("AT+CHLD=4", AtTimeout::Chld))
}

pub fn dtmf(ctx: &Context, tone: char) -> HandlerResult {
    advisory(ctx.command(&format!("AT+VTS={tone}"), AtTimeout::Normal))
}

pub fn last_fail_cause(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT#CEER", "#CEER:", AtTimeout::Normal)
        .checked()?;

    Ok(Response::Int(first_int(&response)?))
}

pub fn query_clip(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT+CLIP?", "+CLIP:", AtTimeout::Clip)
        .checked()?;
    let mut tok = response.tokens()?;
    let _presentation = tok.next_int()?;

    Ok(Response::Int(tok.next_int()?))
}

pub fn get_clir(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT+CLIR?", "+CLIR:", AtTimeout::Clir)
        .checked()?;
    let mut tok = response.tokens()?;

    Ok(Response::Ints(vec![tok.next_int()?, tok.next_int()?]))
}

pub fn set_clir(ctx: &Context, mode: i32) -> HandlerResult {
    expect_ok(ctx.command(&format!("AT+CLIR={mode}"), AtTimeout::Clir))
}

pub fn query_call_waiting(ctx: &Context, service_class: i32) -> HandlerResult {
    let command = match service_class {
        0 => "AT+CCWA=1,2".to_owned(),
        class => format!("AT+CCWA=1,2,{class}"),
    };
    let response = ctx
        .multiline(&command, "+CCWA:", AtTimeout::Ccwa)
        .checked()?;

    let mut waiting = [0, 0];
    for line in &response.intermediates {
        let mut tok = tokens(line)?;
        if tok.next_int()? != 1 {
            continue;
        }
        // Only voice is reported as enabled; other classes are not mapped.
        if tok.next_int()? == 1 {
            waiting = [1, 1];
        }
    }

    Ok(Response::Ints(waiting.to_vec()))
}

pub fn set_call_waiting(ctx: &Context, enable: bool, service_class: i32) -> HandlerResult {
    let command = format!("AT+CCWA=1,{},{service_class}", u8::from(enable));
    expect_ok(ctx.command(&command, AtTimeout::Ccwa))
}

pub fn set_call_forward(ctx: &Context, forward: &CallForward) -> HandlerResult {
    // <time> is not passed on.
    let command = if forward.status == 0 {
        format!("AT+CCFC={},{}", forward.reason, forward.status)
    } else {
        format!(
            "AT+CCFC={},{},\"{}\",{},{}",
            forward.reason,
            forward.status,
            forward.number.as_deref().unwrap_or_default(),
            forward.toa,
            forward.service_class,
        )
    };

    expect_ok(ctx.command(&command, AtTimeout::Ccfc))
}

fn parse_ccfc(line: &str, reason: i32) -> Result<CallForward, RilError> {
    let mut tok = tokens(line)?;
    let mut forward = CallForward {
        status: tok.next_int()?,
        reason,
        service_class: tok.next_int()?,
        toa: 0,
        number: None,
        time_seconds: 0,
    };

    let Ok(number) = tok.next_str() else {
        return Ok(forward);
    };
    match tok.next_int() {
        Ok(toa) => forward.toa = toa,
        Err(e) if !number.is_empty() => return Err(e.into()),
        Err(_) => {}
    }
    forward.number = Some(number.to_owned());

    Ok(forward)
}

pub fn query_call_forward(ctx: &Context, reason: i32) -> HandlerResult {
    let response = ctx
        .multiline(&format!("AT+CCFC={reason},2"), "+CCFC:", AtTimeout::Ccfc)
        .checked()?;

    let forwards = response
        .intermediates
        .iter()
        .map(|line| parse_ccfc(line, reason))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Response::CallForwards(forwards))
}

pub fn change_barring_password(
    ctx: &Context,
    facility: &str,
    old_password: &str,
    new_password: &str,
) -> HandlerResult {
    let command = format!("AT+CPWD=\"{facility}\",\"{old_password}\",\"{new_password}\"");
    expect_ok(ctx.command(&command, AtTimeout::Cpwd))
}

pub fn set_mute(ctx: &Context, mute: bool) -> HandlerResult {
    expect_ok(ctx.command(&format!("AT+CMUT={}", u8::from(mute)), AtTimeout::Normal))
}

pub fn get_mute(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT+CMUT?", "+CMUT:", AtTimeout::Normal)
        .checked()?;

    Ok(Response::Int(first_int(&response)?))
}
