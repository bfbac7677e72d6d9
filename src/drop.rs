//! Drop guards used to trace the lifetime of owned threads.

/// Drop guard returned by [`defer`].
#[must_use = "`Defer` should be assigned to a variable, or it will be dropped immediately"]
pub struct Defer<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        if let Some(cb) = self.0.take() {
            cb();
        }
    }
}

/// Returns a value that runs `cb` when dropped, including during unwinding.
pub fn defer<F: FnOnce()>(cb: F) -> Defer<F> {
    Defer(Some(cb))
}

/// Logs that the current thread of the given `kind` is starting, and returns a guard that logs its
/// exit.
///
/// Threads without a name are not traced.
pub fn trace_lifetime(kind: &'static str, name: Option<String>) -> Option<Defer<impl FnOnce()>> {
    let name = name?;
    log::trace!("{kind} '{name}' starting");
    Some(defer(move || log::trace!("{kind} '{name}' exiting")))
}
