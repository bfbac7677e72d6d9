//! Internal unit test utilities.

use crate::RenderSink;

/// Installs a test logger; `RUST_LOG=pawtition=trace` shows thread lifetimes.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A [`RenderSink`] that records every counter value it is shown.
///
/// After each value, `on_update` is called with everything recorded so far, still on the sink
/// owner's thread.
pub struct Recorder<F> {
    values: Vec<i64>,
    on_update: F,
}

impl<F: FnMut(&[i64])> Recorder<F> {
    pub fn new(on_update: F) -> Self {
        Self {
            values: Vec::new(),
            on_update,
        }
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }
}

impl<F: FnMut(&[i64])> RenderSink for Recorder<F> {
    fn apply(&mut self, text: &str) {
        let value = text
            .parse::<i64>()
            .unwrap_or_else(|e| panic!("sink was shown non-numeric text {text:?}: {e}"));
        self.values.push(value);
        (self.on_update)(&self.values);
    }
}
