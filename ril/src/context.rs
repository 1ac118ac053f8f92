use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use crate::{
    at::{
        channel::AtChannel,
        response::{AtError, AtResponse},
        timeout::AtTimeout,
    },
    config::{Timings, WakeLock},
    jobs::JobQueue,
    properties::Properties,
    session::Session,
    sync::lock,
};

/// Everything a job needs: the session, the current channel and the
/// collaborators around the modem.
pub struct Context {
    pub session: Session,
    pub jobs: JobQueue,
    pub properties: Box<dyn Properties>,
    pub timings: Timings,
    pub wake_lock: Option<WakeLock>,
    channel: Mutex<Option<Arc<AtChannel>>>,
}

impl Context {
    pub fn new(
        session: Session,
        jobs: JobQueue,
        properties: Box<dyn Properties>,
        timings: Timings,
        wake_lock: Option<WakeLock>,
    ) -> Self {
        Self {
            session,
            jobs,
            properties,
            timings,
            wake_lock,
            channel: Mutex::new(None),
        }
    }

    /// Replaces the channel; the previous one is closed when dropped.
    pub fn install_channel(&self, channel: AtChannel) {
        *lock(&self.channel) = Some(Arc::new(channel));
    }

    pub fn channel(&self) -> Result<Arc<AtChannel>, AtError> {
        lock(&self.channel).clone().ok_or(AtError::ChannelClosed)
    }

    pub fn close_channel(&self) {
        if let Some(channel) = lock(&self.channel).as_ref() {
            channel.close();
        }
    }

    fn timeout(&self, timeout: AtTimeout) -> Duration {
        let budget = Duration::from(timeout);
        self.timings
            .at_timeout_override
            .map_or(budget, |cap| cap.min(budget))
    }

    pub fn command(&self, command: &str, timeout: AtTimeout) -> Result<AtResponse, AtError> {
        self.channel()?.command(command, self.timeout(timeout))
    }

    pub fn numeric(&self, command: &str, timeout: AtTimeout) -> Result<AtResponse, AtError> {
        self.channel()?.numeric(command, self.timeout(timeout))
    }

    pub fn singleline(
        &self,
        command: &str,
        prefix: &str,
        timeout: AtTimeout,
    ) -> Result<AtResponse, AtError> {
        self.channel()?
            .singleline(command, prefix, self.timeout(timeout))
    }

    pub fn multiline(
        &self,
        command: &str,
        prefix: &str,
        timeout: AtTimeout,
    ) -> Result<AtResponse, AtError> {
        self.channel()?
            .multiline(command, prefix, self.timeout(timeout))
    }

    pub fn sms(
        &self,
        command: &str,
        pdu: &str,
        prefix: &str,
        timeout: AtTimeout,
    ) -> Result<AtResponse, AtError> {
        self.channel()?
            .sms(command, pdu, prefix, self.timeout(timeout))
    }

    pub fn sleep(&self, delay: Duration) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}
