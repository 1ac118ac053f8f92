use super::{HandlerResult, expect_ok};
use crate::{at::timeout::AtTimeout, context::Context};

/// The network answer arrives later as a `+CUSD:` line.
pub fn send_ussd(ctx: &Context, ussd: &str) -> HandlerResult {
    expect_ok(ctx.command(&format!("AT+CUSD=1,\"{ussd}\""), AtTimeout::Normal))
}

pub fn cancel_ussd(ctx: &Context) -> HandlerResult {
    expect_ok(ctx.command("AT+CUSD=2", AtTimeout::Normal))
}

pub fn set_notification(ctx: &Context, enable: bool) -> HandlerResult {
    let n = u8::from(enable);
    expect_ok(ctx.command(&format!("AT+CSSN={n},{n}"), AtTimeout::Normal))
}
