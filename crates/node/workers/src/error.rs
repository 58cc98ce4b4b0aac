//! Worker pool errors.

use thiserror::Error;

/// An error from the worker pool.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A worker could not be started.
    #[error("failed to spawn worker {id}: {reason}")]
    Spawn {
        /// The worker id.
        id: usize,
        /// The failure.
        reason: String,
    },
    /// The worker exited before finishing its task.
    #[error("worker {0} exited before finishing its task")]
    Exited(usize),
    /// The task ran and failed.
    #[error("task failed on worker {worker}: {reason}")]
    Task {
        /// The worker id.
        worker: usize,
        /// The failure reported by the worker.
        reason: String,
        /// Whether the worker flagged the failure as one the caller cannot proceed past.
        fatal: bool,
    },
    /// Every worker has exited.
    #[error("no workers left in the pool")]
    NoWorkers,
    /// The pool has been ended.
    #[error("the worker pool has been ended")]
    Ended,
    /// Worker side i/o failed.
    #[error("worker i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// A message could not be encoded or decoded.
    #[error("malformed worker message: {0}")]
    Codec(String),
}

impl WorkerError {
    /// Returns `true` if the worker itself is gone, as opposed to the task failing.
    pub const fn is_worker_lost(&self) -> bool {
        matches!(self, Self::Exited(_) | Self::NoWorkers | Self::Ended)
    }

    /// Returns `true` if the caller cannot proceed past this error: the worker is gone or the
    /// task failed in a way it flagged as fatal.
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Task { fatal, .. } => *fatal,
            _ => self.is_worker_lost(),
        }
    }
}
