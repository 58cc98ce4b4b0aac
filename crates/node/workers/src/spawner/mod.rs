//! Ways of starting a worker.

use crate::{ParentMessage, WorkerError, WorkerMessage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod local;
pub use local::LocalSpawner;

mod process;
pub use process::ProcessSpawner;

/// The parent's end of a running worker.
///
/// `inbound` closes when the worker is gone, whatever the reason.
#[derive(Debug)]
pub struct WorkerLink<Req, Resp> {
    /// Messages to the worker.
    pub outbound: mpsc::UnboundedSender<ParentMessage<Req>>,
    /// Messages from the worker.
    pub inbound: mpsc::UnboundedReceiver<WorkerMessage<Resp>>,
    /// Cancelling this token kills the worker.
    pub kill: CancellationToken,
}

/// Starts workers for a [`WorkerPool`](crate::WorkerPool).
///
/// Must be called from within a tokio runtime.
pub trait Spawner: Send + Sync {
    /// The task description.
    type Request: Send + 'static;
    /// The task result.
    type Response: Send + 'static;

    /// Starts the worker with the given id.
    fn spawn(&self, id: usize) -> Result<WorkerLink<Self::Request, Self::Response>, WorkerError>;
}
