use std::sync::{Condvar, Mutex};

use derive_more::Display;
use serde::Serialize;
use tracing::info;

use crate::sync::{lock, wait};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RadioState {
    #[display("UNAVAILABLE")]
    Unavailable,
    #[display("OFF")]
    Off,
    #[display("ON")]
    On,
}

#[derive(Debug)]
struct Inner {
    state: RadioState,
    closed: bool,
    /// Bumped by every open, so a late close of an old channel is ignored.
    generation: u64,
}

/// Radio availability plus the channel closed flag.
///
/// While the channel is marked closed every transition lands on
/// [`RadioState::Unavailable`], regardless of what the caller asked for. The
/// flag is only cleared by [`RadioStateMachine::mark_open`] once a new
/// channel exists. Closes are tagged with the generation `mark_open`
/// returned.
#[derive(Debug)]
pub struct RadioStateMachine {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Default for RadioStateMachine {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RadioState::Unavailable,
                closed: false,
                generation: 0,
            }),
            changed: Condvar::new(),
        }
    }
}

impl RadioStateMachine {
    pub fn current(&self) -> RadioState {
        lock(&self.inner).state
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    /// Returns the new state if it differs from the previous one.
    pub fn set(&self, requested: RadioState) -> Option<RadioState> {
        let mut inner = lock(&self.inner);
        let next = if inner.closed {
            RadioState::Unavailable
        } else {
            requested
        };
        if inner.state == next {
            return None;
        }

        info!("radio state {} -> {next}", inner.state);
        inner.state = next;
        self.changed.notify_all();

        Some(next)
    }

    /// Marks the channel closed and forces [`RadioState::Unavailable`].
    /// Returns the new state if the radio state changed.
    pub fn mark_closed(&self, generation: u64) -> Option<RadioState> {
        {
            let mut inner = lock(&self.inner);
            if inner.generation != generation {
                return None;
            }
            inner.closed = true;
            self.changed.notify_all();
        }
        self.set(RadioState::Unavailable)
    }

    pub fn mark_open(&self) -> u64 {
        let mut inner = lock(&self.inner);
        inner.closed = false;
        inner.generation += 1;
        self.changed.notify_all();

        inner.generation
    }

    /// Blocks until the channel is marked closed.
    pub fn wait_for_close(&self) {
        let mut inner = lock(&self.inner);
        while !inner.closed {
            inner = wait(&self.changed, inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    #[test]
    fn test_starts_unavailable() {
        let radio = RadioStateMachine::default();
        assert_eq!(radio.current(), RadioState::Unavailable);
        assert!(!radio.is_closed());
    }

    #[test]
    fn test_only_real_changes_are_reported() {
        let radio = RadioStateMachine::default();
        assert_eq!(radio.set(RadioState::Off), Some(RadioState::Off));
        assert_eq!(radio.set(RadioState::Off), None);
        assert_eq!(radio.set(RadioState::On), Some(RadioState::On));
        assert_eq!(radio.set(RadioState::Off), Some(RadioState::Off));
    }

    #[test]
    fn test_closed_is_sticky_until_reopened() {
        let radio = RadioStateMachine::default();
        radio.set(RadioState::On);

        assert_eq!(radio.mark_closed(0), Some(RadioState::Unavailable));
        assert_eq!(radio.mark_closed(0), None);
        assert_eq!(radio.set(RadioState::On), None);
        assert_eq!(radio.current(), RadioState::Unavailable);

        radio.mark_open();
        assert_eq!(radio.set(RadioState::Off), Some(RadioState::Off));
    }

    #[test]
    fn test_stale_close_is_ignored() {
        let radio = RadioStateMachine::default();
        let first = radio.mark_open();
        assert_eq!(radio.mark_closed(first), Some(RadioState::Unavailable));

        let second = radio.mark_open();
        radio.set(RadioState::Off);
        assert_eq!(radio.mark_closed(first), None);
        assert!(!radio.is_closed());
        assert_eq!(radio.current(), RadioState::Off);

        assert_eq!(radio.mark_closed(second), Some(RadioState::Unavailable));
    }

    #[test]
    fn test_wait_for_close_wakes_up() {
        let radio = Arc::new(RadioStateMachine::default());
        let waiter = {
            let radio = radio.clone();
            thread::spawn(move || radio.wait_for_close())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        radio.mark_closed(0);
        waiter.join().unwrap();
    }
}
