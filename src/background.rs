use std::{
    io,
    panic::resume_unwind,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, TryRecvError};

use crate::{drop::trace_lifetime, interrupt::Never};

/// A builder object that can be used to configure and spawn a [`Background`] thread.
#[derive(Clone, Default)]
pub struct BackgroundBuilder {
    name: Option<String>,
}

impl BackgroundBuilder {
    /// Sets the name of the [`Background`] thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    /// Spawns a [`Background`] thread that runs `f` to completion.
    pub fn spawn<R, F>(self, f: F) -> io::Result<Background<R>>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (done_tx, done) = crossbeam_channel::bounded::<Never>(0);
        let mut builder = thread::Builder::new();
        if let Some(name) = self.name.clone() {
            builder = builder.name(name);
        }
        let handle = builder.spawn(move || {
            let _guard = trace_lifetime("background", self.name);
            // Disconnects `done` once `f` has returned or unwound.
            let _done = done_tx;
            f()
        })?;

        Ok(Background {
            handle: Some(handle),
            done,
        })
    }
}

/// A simple run-to-completion background thread.
///
/// This is an owned thread that runs a closure to completion and hands the result back to the
/// owning thread when it calls [`Background::join`]. The result is only reachable through the join,
/// so it can never be observed before the thread has finished.
///
/// Dropping a [`Background`] object joins the thread. If the thread panicked, the panic will be
/// propagated to the owner. [`Background::detach`] gives up ownership instead, for threads the
/// owner has stopped waiting for.
pub struct Background<R> {
    handle: Option<JoinHandle<R>>,
    done: Receiver<Never>,
}

impl<R> Drop for Background<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                if !thread::panicking() {
                    resume_unwind(payload);
                }
            }
        }
    }
}

impl Background<()> {
    /// Returns a builder that can be used to configure and spawn a [`Background`] thread.
    #[inline]
    pub fn builder() -> BackgroundBuilder {
        BackgroundBuilder::default()
    }
}

impl<R: Send + 'static> Background<R> {
    /// Blocks on the background thread and returns its result.
    ///
    /// If the thread panics, the panic will be propagated to the owner.
    pub fn join(self) -> R {
        match self.try_join() {
            Ok(r) => r,
            Err(payload) => resume_unwind(payload),
        }
    }

    /// Blocks on the background thread and returns its result, or the panic payload if the thread
    /// panicked.
    pub fn try_join(mut self) -> thread::Result<R> {
        // `handle` is only ever taken by consuming methods and `Drop`.
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => unreachable!("background thread joined twice"),
        }
    }

    /// Returns whether the thread has finished running its closure.
    ///
    /// If this returns `true`, [`Background::join`] will not block for long.
    pub fn is_finished(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Releases ownership of the thread, letting it run to completion on its own.
    ///
    /// The result and any panic of the thread are discarded.
    pub fn detach(mut self) {
        drop(self.handle.take());
    }

    /// The channel that disconnects when the thread is done, for use in `select!`.
    pub(crate) fn done(&self) -> &Receiver<Never> {
        &self.done
    }
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{catch_unwind, AssertUnwindSafe},
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };

    use super::*;

    fn silent_panic(payload: String) {
        resume_unwind(Box::new(payload));
    }

    #[test]
    fn join_returns_result() {
        let bg = Background::builder()
            .name("test_background")
            .spawn(|| 2 + 2)
            .unwrap();
        assert_eq!(bg.join(), 4);
    }

    #[test]
    fn join_propagates_panic() {
        let bg = Background::builder()
            .spawn(|| silent_panic("background panic".into()))
            .unwrap();
        catch_unwind(AssertUnwindSafe(|| bg.join())).unwrap_err();
    }

    #[test]
    fn drop_propagates_panic() {
        let bg = Background::builder()
            .spawn(|| silent_panic("background panic".into()))
            .unwrap();
        catch_unwind(AssertUnwindSafe(|| drop(bg))).unwrap_err();
    }

    #[test]
    fn try_join_returns_payload() {
        let bg = Background::builder()
            .spawn(|| silent_panic("background panic".into()))
            .unwrap();
        let payload = bg.try_join().unwrap_err();
        assert_eq!(
            payload.downcast_ref::<String>().map(String::as_str),
            Some("background panic")
        );
    }

    #[test]
    fn is_finished_after_completion() {
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        let bg = Background::builder()
            .spawn(move || rx.recv().unwrap())
            .unwrap();
        assert!(!bg.is_finished());
        tx.send(()).unwrap();
        assert!(bg.done().recv().is_err());
        assert!(bg.is_finished());
        bg.join();
    }

    #[test]
    fn detach_does_not_wait() {
        let release = Arc::new(AtomicBool::new(false));
        let release2 = release.clone();
        let bg = Background::builder()
            .spawn(move || {
                while !release2.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(5));
                }
            })
            .unwrap();
        bg.detach();
        release.store(true, Ordering::SeqCst);
    }
}
