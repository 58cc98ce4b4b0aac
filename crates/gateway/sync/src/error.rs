//! Doctor and sync errors.

use std::path::PathBuf;
use thiserror::Error;
use weave_sources::FetchError;
use weave_storage::StoreError;
use weave_workers::WorkerError;

/// An error from the gap/fork doctor.
#[derive(Debug, Error)]
pub enum DoctorError {
    /// An ancestor could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The store could not be read or repaired.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The walk reached genesis without meeting a stored block.
    #[error("no stored ancestor of {head}")]
    NoCommonAncestor {
        /// The head the walk started from.
        head: String,
    },
    /// An ancestor does not sit one height below its child.
    #[error("block {hash} at height {height} does not precede its child at {child_height}")]
    BrokenAncestry {
        /// The ancestor hash.
        hash: String,
        /// The ancestor height.
        height: u64,
        /// The child height.
        child_height: u64,
    },
}

/// An error from the sync orchestrator or its tasks.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Upstream failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The worker pool failed.
    #[error(transparent)]
    Worker(#[from] WorkerError),
    /// The doctor failed.
    #[error(transparent)]
    Doctor(#[from] DoctorError),
    /// The hash list cache could not be read or written.
    #[error("hash list cache {path}: {reason}")]
    HashListCache {
        /// The cache file.
        path: PathBuf,
        /// The failure.
        reason: String,
    },
    /// A height kept asking to be requeued.
    #[error("block {height} still incomplete after {attempts} attempts")]
    RequeueExhausted {
        /// The height.
        height: u64,
        /// The attempts made.
        attempts: usize,
    },
    /// Catch-up kept finding gaps.
    #[error("gaps remain after {0} catch-up rounds")]
    Stalled(usize),
    /// A worker answered a task with the response of another task.
    #[error("unexpected worker response to {0}")]
    UnexpectedResponse(&'static str),
}

impl SyncError {
    /// Returns `true` if the sync cannot continue past this error.
    ///
    /// Non-fatal errors only occur while polling, where the failed block is retried on the next
    /// tick.
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Fetch(err) => err.is_fatal(),
            Self::Store(_) => false,
            Self::Worker(err) => err.is_fatal(),
            Self::Doctor(_)
            | Self::HashListCache { .. }
            | Self::RequeueExhausted { .. }
            | Self::Stalled(_)
            | Self::UnexpectedResponse(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::store(SyncError::Store(StoreError::Backend("down".into())), false)]
    #[case::task(
        SyncError::Worker(WorkerError::Task { worker: 0, reason: "x".into(), fatal: false }),
        false
    )]
    #[case::fatal_task(
        SyncError::Worker(WorkerError::Task { worker: 0, reason: "no peers".into(), fatal: true }),
        true
    )]
    #[case::exited(SyncError::Worker(WorkerError::NoWorkers), true)]
    #[case::transport(
        SyncError::Fetch(FetchError::Transport { peer: "p".into(), reason: "refused".into() }),
        false
    )]
    #[case::exhausted(
        SyncError::Fetch(FetchError::Exhausted { what: "info".into(), attempts: 100 }),
        true
    )]
    #[case::stalled(SyncError::Stalled(10), true)]
    fn test_is_fatal(#[case] err: SyncError, #[case] fatal: bool) {
        assert_eq!(err.is_fatal(), fatal);
    }
}
