use std::{
    io::{self, BufRead as _, Write as _},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use clap::{
    ArgGroup, Parser,
    builder::{Styles, styling::AnsiColor},
};
use color_eyre::eyre::{Result, WrapErr as _};
use orb_ril::{
    Ril, RilConfig,
    at::port::Endpoint,
    config::WakeLock,
    env::{RilEnvironment, RilError, Token, Unsolicited},
    properties::SystemdProperties,
    request::{Request, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// AT-command radio interface layer bridge for Telit modems.
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    styles = clap_v3_styles(),
    group(ArgGroup::new("endpoint").required(true).args(["port", "socket", "device"])),
)]
struct Cli {
    /// Loopback TCP port of the modem, typically an emulator.
    #[clap(short, long, env = "ORB_RIL_PORT")]
    port: Option<u16>,
    /// UNIX domain socket of the modem.
    #[clap(short, long, env = "ORB_RIL_SOCKET")]
    socket: Option<PathBuf>,
    /// Serial device of the modem.
    #[clap(short, long, env = "ORB_RIL_DEVICE")]
    device: Option<PathBuf>,
    /// Directory holding the kernel wake lock files.
    #[clap(long, default_value = "/sys/power")]
    wake_lock_dir: PathBuf,
    /// Read JSON requests from stdin, one per line, until EOF.
    #[clap(long)]
    requests_from_stdin: bool,
}

impl Cli {
    fn endpoint(&self) -> Option<Endpoint> {
        if let Some(port) = self.port {
            return Some(Endpoint::Loopback(port));
        }
        if let Some(path) = &self.socket {
            return Some(Endpoint::LocalSocket(path.clone()));
        }
        self.device.clone().map(Endpoint::Serial)
    }
}

fn clap_v3_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Green.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Serialize)]
#[serde(untagged)]
enum Output<'a> {
    Completion {
        token: Token,
        error: Option<i32>,
        response: Option<&'a Response>,
    },
    Event {
        unsolicited: &'a Unsolicited,
    },
}

#[derive(Deserialize)]
struct Input {
    token: Token,
    request: Request,
}

/// Prints completions and events as JSON lines on stdout.
#[derive(Default)]
struct StdoutEnvironment {
    stdout: Mutex<()>,
}

impl StdoutEnvironment {
    fn emit(&self, output: &Output<'_>) {
        let line = match serde_json::to_string(output) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize output: {e}");
                return;
            }
        };
        let _guard = self.stdout.lock().unwrap_or_else(|e| e.into_inner());
        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{line}").and_then(|()| stdout.flush()) {
            warn!("failed to write to stdout: {e}");
        }
    }
}

impl RilEnvironment for StdoutEnvironment {
    fn complete_request(&self, token: Token, result: Result<Response, RilError>) {
        let output = match &result {
            Ok(response) => Output::Completion {
                token,
                error: None,
                response: Some(response),
            },
            Err(e) => {
                debug!(token, "request failed: {e}");
                Output::Completion {
                    token,
                    error: Some(e.code()),
                    response: None,
                }
            }
        };
        self.emit(&output);
    }

    fn raise_unsolicited(&self, event: Unsolicited) {
        self.emit(&Output::Event { unsolicited: &event });
    }
}

fn forward_requests(ril: &Ril) -> Result<()> {
    for line in io::stdin().lock().lines() {
        let line = line.wrap_err("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Input>(&line) {
            Ok(Input { token, request }) => ril.on_request(request, token),
            Err(e) => warn!("ignoring malformed request {line:?}: {e}"),
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    orb_ril::logging::init();

    let args = Cli::parse();
    let endpoint = args
        .endpoint()
        .ok_or_else(|| color_eyre::eyre::eyre!("no modem endpoint given"))?;
    info!(%endpoint, "starting");

    let config = RilConfig::builder()
        .env(Arc::new(StdoutEnvironment::default()))
        .endpoint(endpoint)
        .properties(Box::new(SystemdProperties::default()))
        .wake_lock(WakeLock::in_dir(&args.wake_lock_dir))
        .build();
    let ril = Ril::start(config).wrap_err("failed to start the bridge")?;
    info!(version = %ril.version(), "started");

    if args.requests_from_stdin {
        let result = forward_requests(&ril);
        ril.stop();
        result
    } else {
        ril.join();
        Ok(())
    }
}
