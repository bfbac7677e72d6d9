//! Parallel matrix sums on a fixed set of row partitions.
//!
//! [`SumPool`] splits a [`Matrix`] into row [`Partition`]s, spawns one [`Background`] thread per
//! partition, joins them all and adds up their partial sums.
//!
//! ```
//! use pawtition::{Matrix, SumPool, Partitioning};
//!
//! let matrix = Matrix::filled(4, 4, 1.0);
//! let pool = SumPool::builder()
//!     .name("sum")
//!     .workers(3)
//!     .partitioning(Partitioning::Balanced)
//!     .build();
//! assert_eq!(pool.sum(&matrix).unwrap(), 16.0);
//! ```

use std::{
    any::Any,
    io,
    time::{Duration, Instant},
};

use crossbeam_channel::{select, Receiver};

use crate::{
    partition::{partition, validate, Partition, PartitionFault, Partitioning},
    Background, Interrupt, Matrix,
};

/// Sums all elements of `matrix` using `workers` threads and the default configuration.
///
/// See [`SumPool::sum`].
pub fn sum(matrix: &Matrix, workers: usize) -> Result<f64, SumError> {
    SumPool::builder().workers(workers).build().sum(matrix)
}

/// Sums all elements in the rows covered by `part`.
///
/// # Panics
///
/// Panics if `part` extends past the last row of `matrix`.
pub fn sum_partition(matrix: &Matrix, part: Partition) -> f64 {
    assert!(
        part.end_row() <= matrix.rows(),
        "{part} lies outside of a matrix with {} rows",
        matrix.rows(),
    );
    matrix
        .iter_rows()
        .skip(part.start_row)
        .take(part.row_count)
        .map(|row| row.iter().sum::<f64>())
        .sum()
}

/// A builder object that can be used to configure a [`SumPool`].
#[derive(Debug, Clone)]
pub struct SumPoolBuilder {
    name: String,
    workers: usize,
    partitioning: Partitioning,
    join_timeout: Option<Duration>,
}

impl SumPoolBuilder {
    /// Sets the base name of the worker threads.
    ///
    /// Each thread spawned will be named according to this base name and its partition index.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// Sets the number of workers to partition the matrix for.
    ///
    /// The pool spawns at most this many threads; depending on the [`Partitioning`] it may spawn
    /// fewer. Defaults to 1.
    #[inline]
    pub fn workers(self, workers: usize) -> Self {
        Self { workers, ..self }
    }

    /// Sets the partitioning policy. Defaults to [`Partitioning::Legacy`].
    #[inline]
    pub fn partitioning(self, partitioning: Partitioning) -> Self {
        Self {
            partitioning,
            ..self
        }
    }

    /// Sets an upper bound on the time spent waiting for all workers of one sum.
    ///
    /// By default, the pool waits indefinitely.
    #[inline]
    pub fn join_timeout(self, timeout: Duration) -> Self {
        Self {
            join_timeout: Some(timeout),
            ..self
        }
    }

    pub fn build(self) -> SumPool {
        SumPool {
            name: self.name,
            workers: self.workers,
            partitioning: self.partitioning,
            join_timeout: self.join_timeout,
        }
    }
}

/// Sums matrices by spreading their rows over a set of short-lived worker threads.
///
/// Every call to [`SumPool::sum`] spawns a fresh set of threads and joins all of them before it
/// returns; no thread outlives a successful call.
#[derive(Debug, Clone)]
pub struct SumPool {
    name: String,
    workers: usize,
    partitioning: Partitioning,
    join_timeout: Option<Duration>,
}

impl SumPool {
    /// Returns a builder that can be used to configure a [`SumPool`].
    #[inline]
    pub fn builder() -> SumPoolBuilder {
        SumPoolBuilder {
            name: "sum".into(),
            workers: 1,
            partitioning: Partitioning::default(),
            join_timeout: None,
        }
    }

    /// Sums all elements of `matrix`.
    ///
    /// The partial sums are added in partition order, so sums computed with different worker counts
    /// may differ in the last bits.
    ///
    /// Returns an error if the partition plan is malformed, if a worker thread cannot be spawned,
    /// or if waiting for a worker is aborted (see [`SumPool::sum_until`]). A partial sum is never
    /// returned.
    pub fn sum(&self, matrix: &Matrix) -> Result<f64, SumError> {
        self.sum_until(matrix, &Interrupt::new())
    }

    /// Sums all elements of `matrix`, giving up when `interrupt` is triggered.
    ///
    /// If `interrupt` is triggered before all workers have been joined, or the configured join
    /// timeout expires, or a worker panics, this returns [`SumError::Aborted`]. Workers that are
    /// still running at that point are detached and run to completion on their own.
    pub fn sum_until(&self, matrix: &Matrix, interrupt: &Interrupt) -> Result<f64, SumError> {
        self.reduce(matrix, interrupt, sum_partition)
    }

    fn reduce(
        &self,
        matrix: &Matrix,
        interrupt: &Interrupt,
        worker: fn(&Matrix, Partition) -> f64,
    ) -> Result<f64, SumError> {
        let plan = partition(matrix.rows(), self.workers, self.partitioning)?;
        validate(&plan, matrix.rows())?;
        log::debug!(
            "pool '{}' summing {}x{} matrix in {} partitions",
            self.name,
            matrix.rows(),
            matrix.cols(),
            plan.len(),
        );

        // Start every worker before joining any of them.
        let mut workers = Vec::with_capacity(plan.len());
        for (index, part) in plan.into_iter().enumerate() {
            let matrix = matrix.clone();
            let spawned = Background::builder()
                .name(format!("{}-{index}", self.name))
                .spawn(move || {
                    log::debug!("working on {part}");
                    worker(&matrix, part)
                });
            match spawned {
                Ok(handle) => workers.push((part, handle)),
                Err(e) => {
                    log::warn!("pool '{}' failed to spawn worker for {part}: {e}", self.name);
                    join_started(workers);
                    return Err(SumError::Spawn(e));
                }
            }
        }

        let deadline = match self.join_timeout {
            Some(timeout) => crossbeam_channel::after(timeout),
            None => crossbeam_channel::never(),
        };
        let mut total = 0.0;
        let mut pending = workers.into_iter();
        while let Some((part, handle)) = pending.next() {
            let joined = match wait_for(&handle, interrupt, &deadline) {
                Ok(()) => handle.try_join().map_err(|payload| AbortCause::Panicked {
                    message: panic_message(&*payload),
                }),
                Err(cause) => {
                    handle.detach();
                    Err(cause)
                }
            };
            match joined {
                Ok(partial) => total += partial,
                Err(cause) => {
                    log::warn!("pool '{}' aborted while joining {part}: {cause}", self.name);
                    pending.for_each(|(_, handle)| handle.detach());
                    return Err(SumError::Aborted {
                        partition: part,
                        cause,
                    });
                }
            }
        }

        Ok(total)
    }
}

/// Joins workers that were started before the pool gave up, discarding their results.
///
/// A worker panic is logged instead of being propagated, so the caller still gets to return its
/// own error.
fn join_started<R: Send + 'static>(workers: Vec<(Partition, Background<R>)>) {
    for (part, handle) in workers {
        if let Err(payload) = handle.try_join() {
            log::warn!("worker for {part} panicked: {}", panic_message(&*payload));
        }
    }
}

/// Waits until `handle` has finished, or the wait is cut short.
fn wait_for<R: Send + 'static>(
    handle: &Background<R>,
    interrupt: &Interrupt,
    deadline: &Receiver<Instant>,
) -> Result<(), AbortCause> {
    if interrupt.is_triggered() {
        return Err(AbortCause::Interrupted);
    }
    if handle.is_finished() {
        return Ok(());
    }
    select! {
        recv(handle.done()) -> _ => Ok(()),
        recv(interrupt.signal()) -> _ => Err(AbortCause::Interrupted),
        recv(deadline) -> _ => Err(AbortCause::TimedOut),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Errors returned by [`SumPool::sum`].
#[derive(Debug, thiserror::Error)]
pub enum SumError {
    #[error("invalid partition plan: {0}")]
    Partition(#[from] PartitionFault),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("computation aborted: worker for {partition} {cause}")]
    Aborted {
        partition: Partition,
        cause: AbortCause,
    },
}

/// Why the pool stopped waiting for a worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbortCause {
    #[error("was interrupted")]
    Interrupted,
    #[error("did not finish in time")]
    TimedOut,
    #[error("panicked: {message}")]
    Panicked { message: String },
}
