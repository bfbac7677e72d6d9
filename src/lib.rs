//! Structured concurrency for two small jobs: summing a matrix on a fixed set of threads, and
//! running a counter thread that can be stopped from the outside.
//!
//! (if you need general-purpose data parallelism, check out [`rayon`] instead; this library only
//! covers the two patterns described below, with owned threads and explicit joins)
//!
//! # Overview
//!
//! Every thread spawned by this library is *owned*: it is represented by a value, and dropping
//! that value joins the thread. If the thread has panicked, the panic will be forwarded to the
//! owner. No thread lingers after the code that started it is done with it, unless it is
//! explicitly detached.
//!
//! ## Partitioned sums
//!
//! [`SumPool`] splits the rows of a [`Matrix`] into contiguous [`Partition`]s, sums every
//! partition on its own [`Background`] thread, joins all of them and adds up the partial sums. A
//! partial sum is only reachable through its thread's join, so it can never be read before the
//! worker is done. If waiting for a worker is interrupted (see [`Interrupt`]), times out, or the
//! worker panics, the whole sum fails with [`SumError::Aborted`].
//!
//! ## Counter agents
//!
//! [`CounterAgent`] is a producer thread that publishes a counter value to a display owned by
//! another thread (the *sink owner*), waits until the sink owner has shown it, then counts up or
//! down. The hand-off goes through the [`render`] module: the agent never touches the display
//! state itself.
//!
//! A [`ModeController`] switches the agent's [`Direction`] and asks it to stop. The stop request
//! is a flag that the agent checks once per tick. A [`Watchdog`] makes the same request after a
//! fixed delay, for agents nobody stops by hand.
//!
//! # Usage
//!
//! Summing a matrix with 3 workers:
//!
//! ```
//! use pawtition::Matrix;
//!
//! let matrix = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).unwrap();
//! let total = pawtition::sum(&matrix, 3).unwrap();
//! assert_eq!(total, 21.0);
//! ```
//!
//! A counter agent that is stopped by a watchdog, with the current thread as the sink owner:
//!
//! ```
//! use std::time::Duration;
//! use pawtition::{render, CounterAgent, StopReason, Watchdog};
//!
//! let (publisher, owner) = render::channel();
//! let agent = CounterAgent::builder()
//!     .name("counter")
//!     .tick(Duration::from_millis(5))
//!     .spawn(publisher)
//!     .unwrap();
//! let watchdog = Watchdog::builder()
//!     .delay(Duration::from_millis(50))
//!     .spawn(&agent.controller())
//!     .unwrap();
//!
//! // Show values until the agent exits and drops its publisher.
//! let mut label = String::new();
//! owner.run(&mut |text: &str| label = text.to_string());
//!
//! let report = agent.join();
//! assert_eq!(report.reason, StopReason::Requested);
//! assert_eq!(report.last_published.map(|v| v.to_string()), Some(label));
//! watchdog.join();
//! ```
//!
//! [`rayon`]: https://crates.io/crates/rayon

mod agent;
mod background;
mod drop;
mod interrupt;
mod matrix;
pub mod partition;
mod pool;
pub mod render;
mod sync;
#[cfg(test)]
mod test;
mod watchdog;

pub use agent::{
    AgentEvent, AgentReport, AgentState, CounterAgent, CounterAgentBuilder, Direction,
    FailurePolicy, ModeController, StopReason, DEFAULT_TICK,
};
pub use background::{Background, BackgroundBuilder};
pub use interrupt::{Interrupt, Interrupted};
pub use matrix::{Matrix, MatrixError};
pub use partition::{Partition, PartitionFault, Partitioning};
pub use pool::{sum, sum_partition, AbortCause, SumError, SumPool, SumPoolBuilder};
pub use render::{PublishError, Publisher, RenderSink, SinkOwner};
pub use watchdog::{Watchdog, WatchdogBuilder, DEFAULT_WATCHDOG_DELAY};
