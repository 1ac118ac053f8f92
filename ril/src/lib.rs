//! AT command radio interface layer bridge for Telit cellular modems.
//!
//! The bridge turns typed telephony requests into AT command exchanges and
//! modem notifications into typed events. Three threads cooperate:
//!
//! - the channel reader, which frames lines and interprets unsolicited ones
//!   without ever sending a command,
//! - the command thread, the only one sending AT commands, which runs
//!   requests, bring-up and deferred follow-ups from one [`jobs`] queue,
//! - the supervisor, which (re)opens the modem endpoint and schedules
//!   bring-up every time the channel is lost.

pub mod at;
pub mod config;
pub mod context;
pub mod env;
pub mod init;
pub mod jobs;
pub mod logging;
pub mod modem;
pub mod properties;
pub mod radio;
pub mod request;
pub mod requests;
pub mod session;
pub mod unsolicited;

mod sync;

use std::{
    io,
    sync::{Arc, Weak},
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    at::{
        channel::{AtChannel, ChannelHandlers},
        port::Endpoint,
    },
    config::{Timings, WakeLock},
    context::Context,
    env::{RilEnvironment, Token, Unsolicited},
    jobs::{Job, JobReceiver},
    modem::version_string,
    properties::Properties,
    radio::RadioState,
    request::{Request, RequestCode},
    session::Session,
};

const STOP_POLL: Duration = Duration::from_millis(20);

#[derive(bon::Builder)]
pub struct RilConfig {
    pub env: Arc<dyn RilEnvironment>,
    pub endpoint: Endpoint,
    pub properties: Box<dyn Properties>,
    #[builder(default)]
    pub timings: Timings,
    /// Power management is enabled only when this is set and usable.
    pub wake_lock: Option<WakeLock>,
}

/// A running bridge.
pub struct Ril {
    ctx: Arc<Context>,
    stop_tx: flume::Sender<()>,
    command_thread: Option<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl Ril {
    pub fn start(config: RilConfig) -> io::Result<Self> {
        let RilConfig {
            env,
            endpoint,
            properties,
            timings,
            wake_lock,
        } = config;
        let wake_lock = wake_lock.filter(|wake_lock| {
            let available = wake_lock.is_available();
            if !available {
                info!(?wake_lock, "wake lock unavailable, power management disabled");
            }
            available
        });

        let (jobs, receiver) = jobs::queue();
        let ctx = Arc::new(Context::new(
            Session::new(env),
            jobs,
            properties,
            timings,
            wake_lock,
        ));
        let (stop_tx, stop_rx) = flume::bounded(1);

        let command_thread = thread::Builder::new()
            .name("ril-commands".to_owned())
            .spawn({
                let ctx = Arc::clone(&ctx);
                move || run_jobs(&ctx, receiver)
            })?;
        let supervisor = thread::Builder::new()
            .name("ril-supervisor".to_owned())
            .spawn({
                let ctx = Arc::downgrade(&ctx);
                move || supervise(&ctx, &endpoint, &stop_rx)
            })?;

        Ok(Self {
            ctx,
            stop_tx,
            command_thread: Some(command_thread),
            supervisor: Some(supervisor),
        })
    }

    /// Queues `request`; it completes through
    /// [`RilEnvironment::complete_request`].
    pub fn on_request(&self, request: Request, token: Token) {
        self.ctx.jobs.post(Job::Request { request, token });
    }

    pub fn current_state(&self) -> RadioState {
        self.ctx.session.radio_state()
    }

    /// Every code of the closed request enumeration has a handler.
    pub fn on_supports(&self, code: RequestCode) -> bool {
        debug!(%code, "supported");
        true
    }

    /// Requests run to completion; cancelling is not possible.
    pub fn on_cancel(&self, token: Token) {
        info!(token, "ignoring cancel");
    }

    pub fn version(&self) -> String {
        version_string(self.ctx.session.identity().as_ref())
    }

    /// Blocks until the bridge stops, which only [`Ril::stop`] does.
    pub fn join(mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            if supervisor.join().is_err() {
                warn!("supervisor thread panicked");
            }
        }
    }

    /// Runs what is already queued, then stops both loops and closes the
    /// channel.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        info!("stopping");
        // Jobs queued so far still run against the open channel.
        self.ctx.jobs.post(Job::Stop);
        if let Some(command_thread) = self.command_thread.take() {
            if command_thread.join().is_err() {
                warn!("command thread panicked");
            }
        }

        self.stop_tx.try_send(()).ok();
        if let Some(supervisor) = self.supervisor.take() {
            // The supervisor may be installing a fresh channel right now.
            while !supervisor.is_finished() {
                self.ctx.close_channel();
                thread::sleep(STOP_POLL);
            }
            if supervisor.join().is_err() {
                warn!("supervisor thread panicked");
            }
        }
        self.ctx.close_channel();
    }
}

impl Drop for Ril {
    fn drop(&mut self) {
        if self.supervisor.is_some() || self.command_thread.is_some() {
            self.shutdown();
        }
    }
}

fn run_jobs(ctx: &Context, receiver: JobReceiver) {
    receiver.run(|job| run_job(ctx, job));
    debug!("command thread exiting");
}

/// Executes one job on the command thread.
pub fn run_job(ctx: &Context, job: Job) {
    match job {
        Job::Initialize => init::initialize(ctx),
        Job::Request { request, token } => requests::dispatch(ctx, request, token),
        Job::PollCallState => ctx.session.raise(Unsolicited::CallStateChanged),
        Job::RefreshDataCallList => {
            if ctx.session.radio_state() == RadioState::Unavailable {
                debug!("radio unavailable, not reading data calls");
                return;
            }
            requests::refresh_data_call_list(ctx);
        }
        Job::SimStatus(line) => init::on_sim_status(ctx, &line),
        Job::Raise(event) => ctx.session.raise(event),
        Job::Stop => {}
    }
}

fn handlers(ctx: &Weak<Context>, generation: u64) -> ChannelHandlers {
    let (on_line, closed, timed_out) = (ctx.clone(), ctx.clone(), ctx.clone());

    ChannelHandlers {
        on_unsolicited: Box::new(move |line, pdu| {
            if let Some(ctx) = on_line.upgrade() {
                unsolicited::on_unsolicited(&ctx.session, &ctx.jobs, &ctx.timings, line, pdu);
            }
        }),
        on_closed: Box::new(move || {
            info!("AT channel closed");
            if let Some(ctx) = closed.upgrade() {
                ctx.session.on_channel_lost(generation);
            }
        }),
        on_timeout: Box::new(move || {
            warn!("AT channel timed out, closing it");
            if let Some(ctx) = timed_out.upgrade() {
                ctx.session.on_channel_lost(generation);
            }
        }),
    }
}

/// Keeps a channel open: opens the endpoint, schedules bring-up, waits for
/// the channel to go away and starts over.
fn supervise(ctx: &Weak<Context>, endpoint: &Endpoint, stop: &flume::Receiver<()>) {
    let stopped = |delay| {
        !matches!(
            stop.recv_timeout(delay),
            Err(flume::RecvTimeoutError::Timeout)
        )
    };

    loop {
        let Some(ctx) = ctx.upgrade() else {
            return;
        };
        if !stop.is_empty() || stop.is_disconnected() {
            return;
        }

        let port = match endpoint.open() {
            Ok(port) => port,
            Err(e) => {
                warn!("failed to open {endpoint}: {e}, retrying");
                let backoff = ctx.timings.reopen_backoff;
                drop(ctx);
                if stopped(backoff) {
                    return;
                }
                continue;
            }
        };
        // Before the reader starts, so an instant close is not lost.
        let generation = ctx.session.radio().mark_open();
        let channel = match AtChannel::open(port, handlers(&Arc::downgrade(&ctx), generation)) {
            Ok(channel) => channel,
            Err(e) => {
                warn!("failed to start AT channel on {endpoint}: {e}");
                let backoff = ctx.timings.reopen_backoff;
                drop(ctx);
                if stopped(backoff) {
                    return;
                }
                continue;
            }
        };

        info!("AT channel open on {endpoint}");
        ctx.install_channel(channel);
        ctx.jobs.post(Job::Initialize);

        ctx.session.radio().wait_for_close();
        ctx.close_channel();
        drop(ctx);
        if !stop.is_empty() || stop.is_disconnected() {
            return;
        }
    }
}
