//! Interrupt tokens for waking blocked threads.
//!
//! Rust threads cannot be interrupted from the outside. Instead, every blocking wait in this crate
//! that needs to be cut short (a join in [`SumPool::sum_until`], a publish or a tick sleep in a
//! [`CounterAgent`]) also waits on an [`Interrupt`]. Triggering the [`Interrupt`] wakes all of
//! those waits at once, and they report [`Interrupted`] to their caller.
//!
//! Once triggered, an [`Interrupt`] stays triggered.
//!
//! [`SumPool::sum_until`]: crate::SumPool::sum_until
//! [`CounterAgent`]: crate::CounterAgent

use std::{sync::Arc, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::sync::Mutex;

/// Nothing is ever sent over the signal channel; it is only ever closed.
pub(crate) enum Never {}

/// A shared, cloneable interrupt token.
///
/// All clones refer to the same token.
#[derive(Clone)]
pub struct Interrupt {
    shared: Arc<Shared>,
}

struct Shared {
    /// Dropped when the token is triggered, which disconnects `signal`.
    trigger: Mutex<Option<Sender<Never>>>,
    signal: Receiver<Never>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupt {
    /// Creates a new, untriggered [`Interrupt`].
    pub fn new() -> Self {
        let (sender, signal) = crossbeam_channel::bounded(0);
        Self {
            shared: Arc::new(Shared {
                trigger: Mutex::new(Some(sender)),
                signal,
            }),
        }
    }

    /// Triggers the interrupt, waking every thread currently waiting on it.
    ///
    /// Triggering an already triggered [`Interrupt`] does nothing.
    pub fn trigger(&self) {
        drop(self.shared.trigger.lock().take());
    }

    /// Returns whether [`Interrupt::trigger`] has been called on this token or any of its clones.
    pub fn is_triggered(&self) -> bool {
        matches!(self.shared.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleeps for `dur`, returning early with [`Interrupted`] if the token is (or already was)
    /// triggered.
    pub fn sleep(&self, dur: Duration) -> Result<(), Interrupted> {
        match self.shared.signal.recv_timeout(dur) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => Err(Interrupted),
            Ok(never) => match never {},
        }
    }

    /// The channel that disconnects when the token is triggered, for use in `select!`.
    pub(crate) fn signal(&self) -> &Receiver<Never> {
        &self.shared.signal
    }
}

/// Error returned by a wait that was cut short by an [`Interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("wait was interrupted")]
pub struct Interrupted;

#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use super::*;

    #[test]
    fn untriggered_sleep_runs_to_completion() {
        let interrupt = Interrupt::new();
        let start = Instant::now();
        interrupt.sleep(Duration::from_millis(20)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!interrupt.is_triggered());
    }

    #[test]
    fn trigger_is_shared_and_sticky() {
        let interrupt = Interrupt::new();
        let clone = interrupt.clone();
        clone.trigger();
        clone.trigger();
        assert!(interrupt.is_triggered());
        assert_eq!(interrupt.sleep(Duration::from_secs(60)), Err(Interrupted));
        assert_eq!(interrupt.sleep(Duration::from_secs(60)), Err(Interrupted));
    }

    #[test]
    fn trigger_wakes_sleeping_thread() {
        let interrupt = Interrupt::new();
        let clone = interrupt.clone();
        let sleeper = thread::spawn(move || clone.sleep(Duration::from_secs(60)));
        thread::sleep(Duration::from_millis(20));
        interrupt.trigger();
        assert_eq!(sleeper.join().unwrap(), Err(Interrupted));
    }
}
