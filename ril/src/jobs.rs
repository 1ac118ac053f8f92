//! Work executed on the command issuing thread.
//!
//! Everything that sends AT commands is funnelled through this queue:
//! requests from the telephony stack, bring-up, and follow-ups that the
//! reader thread noticed but must not perform itself. Jobs may be delayed;
//! they then wait in a timer heap owned by the executing thread.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering as AtomicOrdering},
    },
    time::{Duration, Instant},
};

use flume::RecvTimeoutError;
use tracing::{debug, trace};

use crate::{
    env::{Token, Unsolicited},
    request::Request,
};

#[derive(Debug, PartialEq, Eq)]
pub enum Job {
    /// Run the bring-up sequence on a freshly opened channel.
    Initialize,
    Request { request: Request, token: Token },
    /// Tell upstream to poll the call list again.
    PollCallState,
    /// Re-read the data call list and report it unsolicited.
    RefreshDataCallList,
    /// Act on a `#QSS:` SIM status line.
    SimStatus(String),
    /// Raise an event once the current job has completed.
    Raise(Unsolicited),
    Stop,
}

#[derive(Debug)]
struct Scheduled {
    due: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed, so the max-heap pops the earliest job first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: flume::Sender<Scheduled>,
    seq: Arc<AtomicU64>,
}

#[derive(Debug)]
pub struct JobReceiver {
    rx: flume::Receiver<Scheduled>,
}

pub fn queue() -> (JobQueue, JobReceiver) {
    let (tx, rx) = flume::unbounded();
    let queue = JobQueue {
        tx,
        seq: Arc::new(AtomicU64::new(0)),
    };

    (queue, JobReceiver { rx })
}

impl JobQueue {
    pub fn post(&self, job: Job) {
        self.post_delayed(job, Duration::ZERO);
    }

    pub fn post_delayed(&self, job: Job, delay: Duration) {
        let scheduled = Scheduled {
            due: Instant::now() + delay,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            job,
        };
        trace!(?scheduled.job, ?delay, "queueing job");
        if let Err(flume::SendError(scheduled)) = self.tx.send(scheduled) {
            debug!("job executor is gone, dropping {:?}", scheduled.job);
        }
    }
}

impl JobReceiver {
    /// Executes jobs in due order until [`Job::Stop`] comes up or every
    /// [`JobQueue`] has been dropped.
    pub fn run(self, mut execute: impl FnMut(Job)) {
        let mut timers = BinaryHeap::new();

        loop {
            while timers
                .peek()
                .is_some_and(|next: &Scheduled| next.due <= Instant::now())
            {
                let Some(Scheduled { job, .. }) = timers.pop() else {
                    break;
                };
                if matches!(job, Job::Stop) {
                    debug!("job executor stopping");
                    return;
                }
                execute(job);
            }

            let received = match timers.peek() {
                Some(next) => self.rx.recv_deadline(next.due),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(scheduled) => timers.push(scheduled),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("all job queues dropped, executor exiting");
                    return;
                }
            }
        }
    }
}
