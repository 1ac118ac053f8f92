//! SMS in PDU mode.

use tracing::{debug, info};

use super::{Checked as _, HandlerResult, expect_ok, first_int, first_str, tokens};
use crate::{
    at::timeout::AtTimeout,
    context::Context,
    env::RilError,
    request::{Response, SmsSent},
};

/// Use the SMSC stored on the SIM.
const DEFAULT_SMSC: &str = "00";

/// TP layer length of a hex encoded PDU.
fn tpdu_len(pdu: &str) -> usize {
    pdu.len() / 2
}

pub fn send(ctx: &Context, smsc: Option<&str>, pdu: &str) -> HandlerResult {
    let smsc = smsc.unwrap_or(DEFAULT_SMSC);
    let command = format!("AT+CMGS={}", tpdu_len(pdu));
    let response = ctx
        .sms(&command, &format!("{smsc}{pdu}"), "+CMGS:", AtTimeout::Cmgs)
        .checked()?;
    let message_ref = first_int(&response)?;
    info!(message_ref, "SMS sent");

    Ok(Response::SmsSent(SmsSent {
        message_ref,
        ack_pdu: None,
        error_code: 0,
    }))
}

/// Keeps the relay link open for the next message before sending.
pub fn send_expect_more(ctx: &Context, smsc: Option<&str>, pdu: &str) -> HandlerResult {
    let response = ctx.command("AT+CMMS=1", AtTimeout::Normal)?;
    if !response.success {
        debug!("AT+CMMS=1 failed with {}", response.final_response);
    }

    send(ctx, smsc, pdu)
}

pub fn acknowledge(ctx: &Context, success: bool) -> HandlerResult {
    let command = if success { "AT+CNMA=0" } else { "AT+CNMA=2" };
    let response = ctx.command(command, AtTimeout::Normal)?;
    if !response.success {
        debug!("{command} failed with {}", response.final_response);
    }

    Ok(Response::Empty)
}

/// Stores a PDU on the SIM and returns its index.
pub fn write_to_sim(ctx: &Context, status: i32, pdu: &str) -> HandlerResult {
    let command = format!("AT+CMGW={},{status}", tpdu_len(pdu));
    let response = ctx
        .sms(&command, pdu, "+CMGW:", AtTimeout::Cmgw)
        .checked()?;

    Ok(Response::Int(first_int(&response)?))
}

pub fn delete_on_sim(ctx: &Context, index: i32) -> HandlerResult {
    expect_ok(ctx.command(&format!("AT+CMGD={index}"), AtTimeout::Cmgd))
}

pub fn smsc_address(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT+CSCA?", "+CSCA:", AtTimeout::Csca)
        .checked()?;

    Ok(Response::String(first_str(&response)?))
}

pub fn set_smsc_address(ctx: &Context, address: &str) -> HandlerResult {
    expect_ok(ctx.command(&format!("AT+CSCA=\"{address}\""), AtTimeout::Csca))
}

/// Parses `+CPMS: "mem",used,total,...` into whether there is room left.
fn has_free_slots(line: &str) -> Result<bool, RilError> {
    let mut tok = tokens(line)?;
    let _memory = tok.next_str()?;
    let used = tok.next_int()?;
    let total = tok.next_int()?;

    Ok(total > used)
}

pub fn memory_status(ctx: &Context) -> HandlerResult {
    let response = ctx
        .singleline("AT+CPMS?", "+CPMS:", AtTimeout::Normal)
        .checked()?;

    Ok(Response::Int(has_free_slots(response.line()?)?.into()))
}

pub fn broadcast_activation(ctx: &Context, disable: bool) -> HandlerResult {
    let command = if disable {
        "AT+CNMI=,,0,,"
    } else {
        "AT+CNMI=,,2,,"
    };

    expect_ok(ctx.command(command, AtTimeout::Normal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tpdu_len_is_half_the_hex() {
        assert_eq!(tpdu_len("0001000B915121551532F400000CC8F79D9C07E54F61363B04"), 25);
    }

    #[test]
    fn test_memory_status() {
        assert!(has_free_slots("+CPMS: \"SM\",3,30,\"SM\",3,30,\"SM\",3,30").unwrap());
        assert!(!has_free_slots("+CPMS: \"SM\",30,30").unwrap());
        assert!(has_free_slots("+CPMS: 3,30").is_err());
    }
}
