use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crate::{agent::ModeController, Background};

/// The delay used when none is configured.
pub const DEFAULT_WATCHDOG_DELAY: Duration = Duration::from_secs(10);

/// A builder object that can be used to configure and spawn a [`Watchdog`].
#[derive(Debug, Clone)]
pub struct WatchdogBuilder {
    name: Option<String>,
    delay: Duration,
}

impl WatchdogBuilder {
    /// Sets the name of the watchdog thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets how long the watchdog waits before stopping the agent. Defaults to
    /// [`DEFAULT_WATCHDOG_DELAY`].
    #[inline]
    pub fn delay(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    /// Spawns a [`Watchdog`] that will stop the agent steered by `controller`.
    pub fn spawn(self, controller: &ModeController) -> io::Result<Watchdog> {
        let controller = controller.clone();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let delay = self.delay;

        let mut builder = Background::builder();
        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        let thread = builder.spawn(move || {
            thread::sleep(delay);
            log::debug!("watchdog fired after {delay:?}");
            controller.request_stop();
            fired2.store(true, Ordering::SeqCst);
        })?;

        Ok(Watchdog {
            thread,
            fired,
            delay,
        })
    }
}

/// A one-shot timer thread that stops a [`CounterAgent`] after a fixed delay.
///
/// The watchdog only holds a [`ModeController`], never the agent itself. Once spawned, it always
/// fires: its sleep cannot be cancelled, and it does not retry. Stopping an agent that has already
/// stopped is harmless.
///
/// Like every owned thread in this crate, dropping a [`Watchdog`] joins its thread, which means
/// waiting out the rest of the delay. Use [`Watchdog::detach`] to let it fire on its own.
///
/// [`CounterAgent`]: crate::CounterAgent
pub struct Watchdog {
    thread: Background<()>,
    fired: Arc<AtomicBool>,
    delay: Duration,
}

impl Watchdog {
    /// Returns a builder that can be used to configure and spawn a [`Watchdog`].
    #[inline]
    pub fn builder() -> WatchdogBuilder {
        WatchdogBuilder {
            name: None,
            delay: DEFAULT_WATCHDOG_DELAY,
        }
    }

    /// Spawns a [`Watchdog`] with the default delay.
    pub fn spawn(controller: &ModeController) -> io::Result<Self> {
        Self::builder().spawn(controller)
    }

    /// Returns whether the watchdog has requested the stop.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Blocks until the watchdog has fired.
    pub fn join(self) {
        self.thread.join();
    }

    /// Lets the watchdog fire on its own, without an owner.
    pub fn detach(self) {
        self.thread.detach();
    }
}
