use std::io::IsTerminal as _;

use eyre::WrapErr as _;
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::LevelFilter, layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
};

const SYSLOG_IDENTIFIER: &str = "worldcoin-ril";

fn filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}

fn try_init_journal() -> eyre::Result<()> {
    let journal = tracing_journald::layer()
        .wrap_err("failed to initialize journald logger")?
        .with_syslog_identifier(SYSLOG_IDENTIFIER.to_owned())
        .with_filter(filter());
    tracing_subscriber::registry().with(journal).try_init()?;

    Ok(())
}

/// Stdout may carry the JSON protocol, so logs always go to stderr.
fn try_init_stderr_logger() -> eyre::Result<()> {
    let stderr_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(filter());
    tracing_subscriber::registry().with(stderr_log).try_init()?;

    Ok(())
}

/// Logs to journald when running as a service, to stderr otherwise.
pub fn init() {
    let mut err = None;
    let is_tty = std::io::stderr().is_terminal();
    if !is_tty {
        err = try_init_journal().err();
    }
    if is_tty || err.is_some() {
        if let Err(e) = try_init_stderr_logger() {
            eprintln!("failed to initialize logging: {e:?}");
        }
    }
    if let Some(e) = err {
        tracing::warn!("journald unavailable, logging to stderr: {e:?}");
    }
}
