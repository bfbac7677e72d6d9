//! Blocking hand-off of display updates to the thread that owns the display.
//!
//! Display state (a label, a terminal line, a test recorder) is owned by exactly one thread, the
//! *sink owner*. Other threads never touch it. Instead they hold a [`Publisher`], and
//! [`Publisher::publish`] hands an immutable piece of text to the sink owner and blocks until the
//! owner has applied it to its [`RenderSink`] and acknowledged.
//!
//! ```
//! use pawtition::{render, Interrupt};
//!
//! let (publisher, owner) = render::channel();
//! let producer = pawtition::Background::builder().spawn(move || {
//!     let interrupt = Interrupt::new();
//!     for i in 0..3 {
//!         publisher.publish(i.to_string(), &interrupt).unwrap();
//!     }
//! }).unwrap();
//!
//! // The owner thread applies updates until every publisher is gone.
//! let mut shown = Vec::new();
//! owner.run(&mut |text: &str| shown.push(text.to_string()));
//! producer.join();
//! assert_eq!(shown, ["0", "1", "2"]);
//! ```

use std::time::Duration;

use crossbeam_channel::{select, Receiver, RecvTimeoutError, Sender};

use crate::Interrupt;

/// Creates a connected pair of [`Publisher`] and [`SinkOwner`].
pub fn channel() -> (Publisher, SinkOwner) {
    let (updates, recv) = crossbeam_channel::bounded(0);
    (Publisher { updates }, SinkOwner { updates: recv })
}

/// Display state that can be updated with a new piece of text.
///
/// A [`RenderSink`] is only ever used on the sink owner's thread, so it does not need to be
/// [`Send`].
pub trait RenderSink {
    fn apply(&mut self, text: &str);
}

impl<F: FnMut(&str)> RenderSink for F {
    fn apply(&mut self, text: &str) {
        self(text)
    }
}

/// A display update waiting to be applied by the sink owner.
///
/// The publisher stays blocked until the update is applied or dropped. Dropping an [`Update`]
/// without applying it (for example because the sink panicked) makes the publisher fail with
/// [`PublishError::Dropped`].
pub struct Update {
    text: String,
    ack: Sender<()>,
}

impl Update {
    /// Returns the text that will be shown.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Applies the update to `sink` and releases the publisher.
    pub fn apply<S: RenderSink + ?Sized>(self, sink: &mut S) {
        sink.apply(&self.text);
        // The publisher may have been interrupted in the meantime; nobody is left to tell.
        self.ack.send(()).ok();
    }
}

/// The sending half of a render channel.
///
/// Any thread may hold a [`Publisher`]; it can be cloned freely.
#[derive(Clone)]
pub struct Publisher {
    updates: Sender<Update>,
}

impl Publisher {
    /// Hands `text` to the sink owner and blocks until it has been applied.
    ///
    /// Both the hand-off and the wait for the acknowledgment can be cut short by `interrupt`. If
    /// `interrupt` is already triggered, nothing is published.
    pub fn publish<T: Into<String>>(
        &self,
        text: T,
        interrupt: &Interrupt,
    ) -> Result<(), PublishError> {
        if interrupt.is_triggered() {
            return Err(PublishError::Interrupted);
        }

        let (ack, acked) = crossbeam_channel::bounded(1);
        let update = Update {
            text: text.into(),
            ack,
        };
        select! {
            send(self.updates, update) -> res => res.map_err(|_| PublishError::Disconnected)?,
            recv(interrupt.signal()) -> _ => return Err(PublishError::Interrupted),
        }
        select! {
            recv(acked) -> res => res.map_err(|_| PublishError::Dropped),
            recv(interrupt.signal()) -> _ => Err(PublishError::Interrupted),
        }
    }
}

/// The receiving half of a render channel, held by the thread that owns the display.
pub struct SinkOwner {
    updates: Receiver<Update>,
}

impl SinkOwner {
    /// Applies updates to `sink` until every [`Publisher`] is gone.
    ///
    /// Returns the number of updates applied.
    pub fn run<S: RenderSink + ?Sized>(&self, sink: &mut S) -> usize {
        let mut applied = 0;
        for update in &self.updates {
            update.apply(sink);
            applied += 1;
        }
        applied
    }

    /// Applies every update that is waiting right now, without blocking.
    ///
    /// Returns the number of updates applied.
    pub fn pump<S: RenderSink + ?Sized>(&self, sink: &mut S) -> usize {
        let mut applied = 0;
        for update in self.updates.try_iter() {
            update.apply(sink);
            applied += 1;
        }
        applied
    }

    /// Waits up to `timeout` for one update and applies it.
    pub fn pump_timeout<S: RenderSink + ?Sized>(
        &self,
        sink: &mut S,
        timeout: Duration,
    ) -> Result<(), RecvTimeoutError> {
        self.updates.recv_timeout(timeout)?.apply(sink);
        Ok(())
    }

    /// Waits for the next update without applying it.
    ///
    /// Returns [`None`] once every [`Publisher`] is gone.
    pub fn recv(&self) -> Option<Update> {
        self.updates.recv().ok()
    }
}

/// Error returned by [`Publisher::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("the sink owner is gone")]
    Disconnected,
    #[error("the sink owner dropped the update without applying it")]
    Dropped,
    #[error("publish was interrupted")]
    Interrupted,
}

#[cfg(test)]
mod tests {
    use std::{
        thread::{self, ThreadId},
        time::Instant,
    };

    use super::*;
    use crate::Background;

    fn spawn_publisher(
        publisher: Publisher,
        interrupt: Interrupt,
        text: &'static str,
    ) -> Background<Result<(), PublishError>> {
        Background::builder()
            .name("test_publisher")
            .spawn(move || publisher.publish(text, &interrupt))
            .unwrap()
    }

    #[test]
    fn update_is_applied_on_owner_thread() {
        let (publisher, owner) = channel();
        let bg = spawn_publisher(publisher, Interrupt::new(), "hello");

        let mut seen: Vec<(String, ThreadId)> = Vec::new();
        let applied = owner.run(&mut |text: &str| seen.push((text.into(), thread::current().id())));
        assert_eq!(applied, 1);
        assert_eq!(seen, [("hello".to_string(), thread::current().id())]);
        assert_eq!(bg.join(), Ok(()));
    }

    #[test]
    fn publish_blocks_until_applied() {
        let (publisher, owner) = channel();
        let bg = spawn_publisher(publisher, Interrupt::new(), "slow");

        let update = owner.recv().unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(!bg.is_finished());
        update.apply(&mut |_: &str| {});
        assert_eq!(bg.join(), Ok(()));
    }

    #[test]
    fn owner_gone() {
        let (publisher, owner) = channel();
        drop(owner);
        assert_eq!(
            publisher.publish("x", &Interrupt::new()),
            Err(PublishError::Disconnected)
        );
    }

    #[test]
    fn dropped_update() {
        let (publisher, owner) = channel();
        let bg = spawn_publisher(publisher, Interrupt::new(), "discarded");
        let update = owner.recv().unwrap();
        assert_eq!(update.text(), "discarded");
        drop(update);
        assert_eq!(bg.join(), Err(PublishError::Dropped));
    }

    #[test]
    fn interrupt_while_owner_is_busy() {
        let (publisher, _owner) = channel();
        let interrupt = Interrupt::new();
        let bg = spawn_publisher(publisher, interrupt.clone(), "never shown");

        let start = Instant::now();
        thread::sleep(Duration::from_millis(20));
        interrupt.trigger();
        assert_eq!(bg.join(), Err(PublishError::Interrupted));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn pump_does_not_block() {
        let (publisher, owner) = channel();
        let mut sink = |_: &str| panic!("nothing was published");
        assert_eq!(owner.pump(&mut sink), 0);
        assert_eq!(
            owner.pump_timeout(&mut sink, Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );

        drop(publisher);
        assert_eq!(
            owner.pump_timeout(&mut sink, Duration::from_millis(10)),
            Err(RecvTimeoutError::Disconnected)
        );
    }
}
