//! A counter thread that publishes every value to a display owned by another thread.
//!
//! A [`CounterAgent`] runs a loop on its own thread. On every tick it publishes the current
//! counter value through a [`Publisher`], waits until the sink owner has shown it, and only then
//! steps the counter up or down. Any thread can steer the agent through a [`ModeController`]:
//! change its [`Direction`], or ask it to stop.
//!
//! ```
//! use std::time::Duration;
//! use pawtition::{render, CounterAgent, StopReason};
//!
//! let (publisher, owner) = render::channel();
//! let agent = CounterAgent::builder()
//!     .name("counter")
//!     .tick(Duration::from_millis(1))
//!     .spawn(publisher)
//!     .unwrap();
//! let controller = agent.controller();
//!
//! let mut shown = Vec::new();
//! owner.run(&mut |text: &str| {
//!     shown.push(text.to_string());
//!     if shown.len() == 3 {
//!         controller.request_stop();
//!     }
//! });
//!
//! let report = agent.join();
//! assert_eq!(shown, ["0", "1", "2"]);
//! assert_eq!(report.reason, StopReason::Requested);
//! ```

use std::{
    fmt, io,
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender};

use crate::{
    render::{PublishError, Publisher},
    Background, Interrupt,
};

/// The tick interval used when none is configured.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Capacity of a [`CounterAgent`]'s event channel. One slot is kept free for
/// [`AgentEvent::Stopped`].
const EVENT_CAPACITY: usize = 32;

/// Which way the counter moves after each published value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Up,
    Down,
}

impl Direction {
    fn step(self, value: i64) -> i64 {
        match self {
            Direction::Up => value.wrapping_add(1),
            Direction::Down => value.wrapping_sub(1),
        }
    }
}

/// Lifecycle of a [`CounterAgent`]'s loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Running,
    /// The loop has decided to exit and is reporting its result.
    Stopping,
    Stopped,
}

impl AgentState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => AgentState::Running,
            1 => AgentState::Stopping,
            _ => AgentState::Stopped,
        }
    }
}

struct CounterState {
    /// Only written by the agent thread.
    value: AtomicI64,
    down: AtomicBool,
    stop_requested: AtomicBool,
    /// An [`AgentState`], only written by the agent thread.
    state: AtomicU8,
}

/// A handle that steers a [`CounterAgent`] from any thread.
///
/// All operations are plain flag writes or reads: they never block and take effect at the
/// agent's next iteration at the latest. Clones refer to the same agent.
#[derive(Clone)]
pub struct ModeController {
    state: Arc<CounterState>,
}

impl ModeController {
    pub(crate) fn new(initial: i64, direction: Direction) -> Self {
        Self {
            state: Arc::new(CounterState {
                value: AtomicI64::new(initial),
                down: AtomicBool::new(direction == Direction::Down),
                stop_requested: AtomicBool::new(false),
                state: AtomicU8::new(AgentState::Running as u8),
            }),
        }
    }

    /// Asks the agent to stop.
    ///
    /// The agent checks for this request before and after every publish, so it stops within one
    /// tick interval (plus the time the sink owner takes to apply an update in flight).
    pub fn request_stop(&self) {
        self.state.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Sets the direction used for every following step.
    pub fn set_direction(&self, direction: Direction) {
        self.state
            .down
            .store(direction == Direction::Down, Ordering::SeqCst);
    }

    /// Makes the counter count up.
    pub fn increment(&self) {
        self.set_direction(Direction::Up);
    }

    /// Makes the counter count down.
    pub fn decrement(&self) {
        self.set_direction(Direction::Down);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state.stop_requested.load(Ordering::SeqCst)
    }

    pub fn direction(&self) -> Direction {
        if self.state.down.load(Ordering::SeqCst) {
            Direction::Down
        } else {
            Direction::Up
        }
    }

    /// Returns the counter value the agent will publish next (or has published last, if it has
    /// stopped right after a publish).
    pub fn value(&self) -> i64 {
        self.state.value.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> AgentState {
        AgentState::from_u8(self.state.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: AgentState) {
        self.state.state.store(state as u8, Ordering::Release);
    }
}

impl fmt::Debug for ModeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeController")
            .field("value", &self.value())
            .field("direction", &self.direction())
            .field("stop_requested", &self.is_stop_requested())
            .field("state", &self.state())
            .finish()
    }
}

/// What a [`CounterAgent`] does when publishing a value fails.
///
/// Interrupted publishes always end the loop, regardless of the policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure, report it as an [`AgentEvent`], and keep counting.
    #[default]
    Tolerate,
    /// Like [`FailurePolicy::Tolerate`], but stop after this many consecutive failures.
    StopAfter(u32),
}

impl FailurePolicy {
    /// Stops the agent after 3 consecutive failures.
    pub const fn strict() -> Self {
        FailurePolicy::StopAfter(3)
    }
}

/// Why a [`CounterAgent`]'s loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// [`ModeController::request_stop`] was called, by a user or a [`Watchdog`].
    ///
    /// [`Watchdog`]: crate::Watchdog
    Requested,
    /// The agent was interrupted while publishing or sleeping.
    Interrupted,
    /// [`FailurePolicy::StopAfter`] gave up.
    PublishFailures { consecutive: u32, last: PublishError },
}

/// Final result of a [`CounterAgent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReport {
    /// Counter value when the loop ended.
    pub value: i64,
    /// The last value that the sink owner acknowledged, if any.
    pub last_published: Option<i64>,
    /// Number of successful publishes.
    pub published: u64,
    pub reason: StopReason,
}

/// Out-of-band notifications sent by a running [`CounterAgent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    PublishFailed { value: i64, error: PublishError },
    /// Always the last event.
    Stopped(AgentReport),
}

/// A builder object that can be used to configure and spawn a [`CounterAgent`].
#[derive(Debug, Clone)]
pub struct CounterAgentBuilder {
    name: Option<String>,
    tick: Duration,
    initial: i64,
    direction: Direction,
    failure_policy: FailurePolicy,
}

impl CounterAgentBuilder {
    /// Sets the name of the agent thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the pause between two iterations. Defaults to [`DEFAULT_TICK`].
    #[inline]
    pub fn tick(self, tick: Duration) -> Self {
        Self { tick, ..self }
    }

    /// Sets the first value to publish. Defaults to 0.
    #[inline]
    pub fn initial(self, initial: i64) -> Self {
        Self { initial, ..self }
    }

    /// Sets the initial direction. Defaults to [`Direction::Up`].
    #[inline]
    pub fn direction(self, direction: Direction) -> Self {
        Self { direction, ..self }
    }

    /// Sets the [`FailurePolicy`]. Defaults to [`FailurePolicy::Tolerate`].
    #[inline]
    pub fn failure_policy(self, failure_policy: FailurePolicy) -> Self {
        Self {
            failure_policy,
            ..self
        }
    }

    /// Spawns a [`CounterAgent`] that publishes its values through `publisher`.
    pub fn spawn(self, publisher: Publisher) -> io::Result<CounterAgent> {
        let controller = ModeController::new(self.initial, self.direction);
        let interrupt = Interrupt::new();
        let (events_tx, events) = crossbeam_channel::bounded(EVENT_CAPACITY);

        let agent = Agent {
            controller: controller.clone(),
            publisher,
            interrupt: interrupt.clone(),
            events: events_tx,
            tick: self.tick,
            failure_policy: self.failure_policy,
        };
        let mut builder = Background::builder();
        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        let thread = builder.spawn(move || agent.run())?;

        Ok(CounterAgent {
            controller,
            interrupt,
            events,
            thread: Some(thread),
        })
    }
}

/// An owned counter thread.
///
/// This type enforces structured concurrency: when it's dropped, the agent is interrupted and its
/// thread is joined. If the thread has panicked, the panic will be forwarded to the thread dropping
/// the [`CounterAgent`].
///
/// Dropping the agent on the sink owner's thread is fine: the interrupt also cuts short a publish
/// that is waiting for that very thread.
pub struct CounterAgent {
    controller: ModeController,
    interrupt: Interrupt,
    events: Receiver<AgentEvent>,
    thread: Option<Background<AgentReport>>,
}

impl Drop for CounterAgent {
    fn drop(&mut self) {
        self.interrupt.trigger();
        drop(self.thread.take());
    }
}

impl CounterAgent {
    /// Returns a builder that can be used to configure and spawn a [`CounterAgent`].
    #[inline]
    pub fn builder() -> CounterAgentBuilder {
        CounterAgentBuilder {
            name: None,
            tick: DEFAULT_TICK,
            initial: 0,
            direction: Direction::Up,
            failure_policy: FailurePolicy::Tolerate,
        }
    }

    /// Returns a [`ModeController`] for this agent.
    pub fn controller(&self) -> ModeController {
        self.controller.clone()
    }

    /// Returns the channel on which the agent reports failures and its final result.
    ///
    /// Reporting never blocks the agent. The channel is bounded: while it is full, further
    /// [`AgentEvent::PublishFailed`] events are discarded (they are still logged), but there is
    /// always room for the final [`AgentEvent::Stopped`].
    pub fn events(&self) -> &Receiver<AgentEvent> {
        &self.events
    }

    /// Interrupts the agent, making it exit as soon as possible.
    ///
    /// Unlike [`ModeController::request_stop`], this also cuts short a publish that is waiting for
    /// the sink owner, and the tick sleep.
    pub fn interrupt(&self) {
        self.interrupt.trigger();
    }

    /// Returns whether the agent thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, Background::is_finished)
    }

    /// Waits for the agent to stop on its own and returns its report.
    ///
    /// This does not ask the agent to stop; use a [`ModeController`] or a [`Watchdog`] for that.
    /// If the agent thread has panicked, the panic will be propagated to the caller.
    ///
    /// [`Watchdog`]: crate::Watchdog
    pub fn join(mut self) -> AgentReport {
        match self.thread.take() {
            Some(thread) => thread.join(),
            None => unreachable!("agent thread joined twice"),
        }
    }

    /// Requests a stop and waits for the agent's report.
    pub fn stop(self) -> AgentReport {
        self.controller.request_stop();
        self.join()
    }
}

/// The state moved onto the agent thread.
struct Agent {
    controller: ModeController,
    publisher: Publisher,
    interrupt: Interrupt,
    events: Sender<AgentEvent>,
    tick: Duration,
    failure_policy: FailurePolicy,
}

impl Agent {
    fn run(self) -> AgentReport {
        let mut value = self.controller.value();
        let mut last_published = None;
        let mut published = 0;
        let mut failures = 0;

        let reason = loop {
            if self.controller.is_stop_requested() {
                break StopReason::Requested;
            }

            // A value that was not shown is published again on the next tick.
            let shown = match self.publisher.publish(value.to_string(), &self.interrupt) {
                Ok(()) => {
                    last_published = Some(value);
                    published += 1;
                    failures = 0;
                    true
                }
                Err(PublishError::Interrupted) => break StopReason::Interrupted,
                Err(error) => {
                    failures += 1;
                    log::warn!("failed to publish counter value {value}: {error}");
                    self.notify(AgentEvent::PublishFailed { value, error });
                    if let FailurePolicy::StopAfter(limit) = self.failure_policy {
                        if failures >= limit {
                            break StopReason::PublishFailures {
                                consecutive: failures,
                                last: error,
                            };
                        }
                    }
                    false
                }
            };

            if self.controller.is_stop_requested() {
                break StopReason::Requested;
            }

            if shown {
                value = self.controller.direction().step(value);
                self.controller.state.value.store(value, Ordering::Relaxed);
            }

            if self.interrupt.sleep(self.tick).is_err() {
                break StopReason::Interrupted;
            }
        };

        self.controller.set_state(AgentState::Stopping);
        log::debug!("counter agent stopping at {value}: {reason:?}");
        let report = AgentReport {
            value,
            last_published,
            published,
            reason,
        };
        // `notify` keeps the last slot free, and the owner may have dropped the receiver already.
        self.events.try_send(AgentEvent::Stopped(report.clone())).ok();
        self.controller.set_state(AgentState::Stopped);
        report
    }

    /// Sends a [`AgentEvent::PublishFailed`] event unless that would take the last free slot.
    ///
    /// The agent is the only sender, so the reserved slot cannot be taken by anyone else.
    fn notify(&self, event: AgentEvent) {
        if self.events.len() + 1 < EVENT_CAPACITY {
            self.events.try_send(event).ok();
        } else {
            log::trace!("event channel full, discarding {event:?}");
        }
    }
}
