//! A [`Mutex`] without lock poisoning.
//!
//! Every owned thread in this crate already forwards its panic to whoever joins it: the pool turns
//! a worker panic into [`SumError::Aborted`], and [`CounterAgent::join`] resumes the agent's panic
//! on the owning thread. Poisoning would only add a second, less precise failure on top of that
//! (an `unwrap` of a poisoned lock somewhere else), so the locks used here recover the guard
//! instead.
//!
//! [`SumError::Aborted`]: crate::SumError::Aborted
//! [`CounterAgent::join`]: crate::CounterAgent::join

use std::{
    ops::{Deref, DerefMut},
    sync,
};

pub struct Mutex<T: ?Sized> {
    inner: sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub const fn new(t: T) -> Mutex<T> {
        Self {
            inner: sync::Mutex::new(t),
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Locks the mutex, recovering the guard if a previous holder panicked.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };

        MutexGuard { inner: guard }
    }
}

pub struct MutexGuard<'a, T: ?Sized + 'a> {
    inner: sync::MutexGuard<'a, T>,
}

impl<'a, T: ?Sized + 'a> Deref for MutexGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'a, T: ?Sized + 'a> DerefMut for MutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
