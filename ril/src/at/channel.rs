//! The AT channel: a reader thread that frames and classifies lines, and a
//! blocking `send` used by the single command issuing thread.

use std::{
    io::{self, ErrorKind, Read as _, Write as _},
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info, trace, warn};

use super::{
    line::{LineFramer, MAX_AT_RESPONSE},
    port::Port,
    response::{AtError, AtResponse, is_final_error, is_final_success, is_sms_unsolicited},
};
use crate::sync::{lock, wait_timeout};

const READ_POLL: Duration = Duration::from_millis(200);
const HANDSHAKE_ATTEMPTS: usize = 8;
const HANDSHAKE_COMMAND: &str = "ATE0Q0V1";
const CTRL_Z: u8 = 0x1A;
const ESC: u8 = 0x1B;

/// Which intermediate lines belong to the command in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    /// Only the final result code is expected.
    NoResult,
    /// One line starting with a digit, e.g. `AT+CGSN`.
    Numeric,
    /// One line starting with the prefix.
    SingleLine(String),
    /// Any number of lines starting with the prefix.
    MultiLine(String),
}

/// Callbacks invoked from the channel's threads.
pub struct ChannelHandlers {
    /// Runs on the reader thread. Must not send AT commands.
    pub on_unsolicited: Box<dyn Fn(&str, Option<&str>) + Send + Sync>,
    /// Runs once per channel, from whichever thread closed it.
    pub on_closed: Box<dyn Fn() + Send + Sync>,
    /// Runs on the sending thread when a command got no final response.
    pub on_timeout: Box<dyn Fn() + Send + Sync>,
}

#[derive(Debug)]
struct Pending {
    command: String,
    kind: ReplyKind,
    pdu: Option<String>,
    intermediates: Vec<String>,
    outcome: Option<(bool, String)>,
    /// The PDU was refused at the prompt.
    aborted: bool,
}

impl Pending {
    fn accepts(&self, line: &str) -> bool {
        match &self.kind {
            ReplyKind::NoResult => false,
            ReplyKind::Numeric => {
                self.intermediates.is_empty()
                    && line.starts_with(|c: char| c.is_ascii_digit())
            }
            ReplyKind::SingleLine(prefix) => {
                self.intermediates.is_empty() && line.starts_with(prefix.as_str())
            }
            ReplyKind::MultiLine(prefix) => line.starts_with(prefix.as_str()),
        }
    }

    fn expects_line(&self) -> bool {
        matches!(self.kind, ReplyKind::Numeric | ReplyKind::SingleLine(_))
    }
}

struct Shared {
    pending: Mutex<Option<Pending>>,
    response: Condvar,
    closed: AtomicBool,
    writer: Mutex<Box<dyn Port>>,
    handlers: ChannelHandlers,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn write(&self, bytes: &[u8], terminator: u8) -> io::Result<()> {
        let mut writer = lock(&self.writer);
        writer.write_all(bytes)?;
        writer.write_all(&[terminator])?;
        writer.flush()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("closing AT channel");
        if let Err(e) = lock(&self.writer).shutdown() {
            debug!("shutting down AT port: {e}");
        }
        {
            let _pending = lock(&self.pending);
            self.response.notify_all();
        }
        (self.handlers.on_closed)();
    }

    fn unsolicited(&self, line: &str, pdu: Option<&str>) {
        (self.handlers.on_unsolicited)(line, pdu);
    }

    fn process_line(&self, line: &str) {
        let mut guard = lock(&self.pending);
        let Some(pending) = guard.as_mut().filter(|p| p.outcome.is_none()) else {
            drop(guard);
            return self.unsolicited(line, None);
        };

        if is_final_success(line) || is_final_error(line) {
            pending.outcome = Some((is_final_success(line), line.to_owned()));
            self.response.notify_all();
            return;
        }

        if line == "> " {
            if let Some(pdu) = pending.pdu.take() {
                let valid = pdu.len() % 2 == 0 && pdu.bytes().all(|b| b.is_ascii_hexdigit());
                pending.aborted = !valid;
                drop(guard);
                let written = if valid {
                    trace!("AT> {pdu}^Z");
                    self.write(pdu.as_bytes(), CTRL_Z)
                } else {
                    warn!("aborting SMS, PDU is not hex: {pdu:?}");
                    self.write(&[], ESC)
                };
                if let Err(e) = written {
                    warn!("failed to write SMS PDU: {e}");
                }
                return;
            }
        }

        if pending.accepts(line) {
            pending.intermediates.push(line.to_owned());
            return;
        }

        drop(guard);
        self.unsolicited(line, None);
    }
}

pub struct AtChannel {
    shared: Arc<Shared>,
}

impl AtChannel {
    /// Takes ownership of `port` and starts the reader thread.
    pub fn open(port: Box<dyn Port>, handlers: ChannelHandlers) -> io::Result<Self> {
        let mut reader = port.try_clone_port()?;
        reader.set_poll_timeout(READ_POLL)?;

        let shared = Arc::new(Shared {
            pending: Mutex::new(None),
            response: Condvar::new(),
            closed: AtomicBool::new(false),
            writer: Mutex::new(port),
            handlers,
        });

        let reader_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("at-reader".to_owned())
            .spawn(move || read_loop(&reader_shared, reader))?;

        Ok(Self { shared })
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Idempotent. The first call fires `on_closed`.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn command(
        &self,
        command: &str,
        timeout: impl Into<Duration>,
    ) -> Result<AtResponse, AtError> {
        self.send(command, ReplyKind::NoResult, None, timeout.into())
    }

    pub fn numeric(
        &self,
        command: &str,
        timeout: impl Into<Duration>,
    ) -> Result<AtResponse, AtError> {
        self.send(command, ReplyKind::Numeric, None, timeout.into())
    }

    pub fn singleline(
        &self,
        command: &str,
        prefix: &str,
        timeout: impl Into<Duration>,
    ) -> Result<AtResponse, AtError> {
        let kind = ReplyKind::SingleLine(prefix.to_owned());
        self.send(command, kind, None, timeout.into())
    }

    pub fn multiline(
        &self,
        command: &str,
        prefix: &str,
        timeout: impl Into<Duration>,
    ) -> Result<AtResponse, AtError> {
        let kind = ReplyKind::MultiLine(prefix.to_owned());
        self.send(command, kind, None, timeout.into())
    }

    /// Sends `command`, waits for the `"> "` prompt, then sends `pdu`
    /// terminated by Ctrl-Z.
    pub fn sms(
        &self,
        command: &str,
        pdu: &str,
        prefix: &str,
        timeout: impl Into<Duration>,
    ) -> Result<AtResponse, AtError> {
        let kind = ReplyKind::SingleLine(prefix.to_owned());
        self.send(command, kind, Some(pdu), timeout.into())
    }

    pub fn send(
        &self,
        command: &str,
        kind: ReplyKind,
        pdu: Option<&str>,
        timeout: Duration,
    ) -> Result<AtResponse, AtError> {
        self.exchange(command, kind, pdu, timeout, true)
    }

    /// Flushes stale state out of the modem by repeating a harmless command
    /// until it is answered.
    pub fn handshake(&self, timeout: Duration) -> Result<(), AtError> {
        for attempt in 1..=HANDSHAKE_ATTEMPTS {
            match self.exchange(HANDSHAKE_COMMAND, ReplyKind::NoResult, None, timeout, false)
            {
                Ok(_) => {
                    // Let any unmatched OK drain before real traffic.
                    thread::sleep(timeout);
                    return Ok(());
                }
                Err(AtError::Timeout) => debug!("handshake attempt {attempt} timed out"),
                Err(e) => return Err(e),
            }
        }

        Err(AtError::Timeout)
    }

    fn exchange(
        &self,
        command: &str,
        kind: ReplyKind,
        pdu: Option<&str>,
        timeout: Duration,
        report_timeout: bool,
    ) -> Result<AtResponse, AtError> {
        let shared = &*self.shared;
        let mut guard = lock(&shared.pending);
        if shared.is_closed() {
            return Err(AtError::ChannelClosed);
        }
        if let Some(in_flight) = guard.as_ref() {
            warn!(
                "refusing {command:?} while {:?} is in flight",
                in_flight.command
            );
            return Err(AtError::CommandInFlight);
        }

        *guard = Some(Pending {
            command: command.to_owned(),
            kind,
            pdu: pdu.map(str::to_owned),
            intermediates: Vec::new(),
            outcome: None,
            aborted: false,
        });

        trace!("AT> {command}");
        if let Err(e) = shared.write(command.as_bytes(), b'\r') {
            *guard = None;
            drop(guard);
            warn!("failed to write {command:?}: {e}");
            shared.close();
            return Err(AtError::Io(e));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let answered = guard.as_ref().is_some_and(|p| p.outcome.is_some());
            let now = Instant::now();
            if answered || shared.is_closed() || now >= deadline {
                break;
            }
            guard = wait_timeout(&shared.response, guard, deadline - now);
        }

        let Some(pending) = guard.take() else {
            return Err(AtError::ChannelClosed);
        };
        drop(guard);

        let expects_line = pending.expects_line();
        let Some((success, final_response)) = pending.outcome else {
            if shared.is_closed() {
                return Err(AtError::ChannelClosed);
            }
            if report_timeout {
                warn!("{command:?} got no final response within {timeout:?}");
                (shared.handlers.on_timeout)();
                shared.close();
            }
            return Err(AtError::Timeout);
        };

        if pending.aborted {
            return Err(AtError::InvalidResponse);
        }
        if success && expects_line && pending.intermediates.is_empty() {
            debug!("{command:?} succeeded without an intermediate line");
            return Err(AtError::InvalidResponse);
        }

        let response = AtResponse {
            success,
            final_response,
            intermediates: pending.intermediates,
        };
        debug!(?response, "{command:?} completed");

        Ok(response)
    }
}

impl Drop for AtChannel {
    fn drop(&mut self) {
        self.shared.close();
    }
}

fn read_loop(shared: &Shared, mut port: Box<dyn Port>) {
    let mut framer = LineFramer::default();
    let mut sms_header: Option<String> = None;
    let mut buf = vec![0u8; MAX_AT_RESPONSE];

    while !shared.is_closed() {
        match port.read(&mut buf) {
            Ok(0) => {
                info!("AT channel reached end of stream");
                break;
            }
            Ok(n) => framer.push(&buf[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                warn!("AT channel read failed: {e}");
                break;
            }
        }

        while let Some(line) = framer.next_line() {
            trace!("AT< {line}");
            if let Some(header) = sms_header.take() {
                shared.unsolicited(&header, Some(&line));
            } else if is_sms_unsolicited(&line) {
                sms_header = Some(line);
            } else {
                shared.process_line(&line);
            }
        }
    }

    shared.close();
}
