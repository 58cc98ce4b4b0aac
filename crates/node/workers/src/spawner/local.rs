//! In-process workers.

use crate::{Spawner, TaskHandler, WorkerError, WorkerLink, serve};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runs each worker as a tokio task with its own clone of the handler.
///
/// There is no memory isolation; a panicking task ends its worker exactly like a crashed process
/// would.
#[derive(Debug, Clone)]
pub struct LocalSpawner<H> {
    handler: H,
}

impl<H> LocalSpawner<H> {
    /// Creates a spawner that hands a clone of `handler` to every worker.
    pub const fn new(handler: H) -> Self {
        Self { handler }
    }
}

impl<H: TaskHandler + Clone> Spawner for LocalSpawner<H> {
    type Request = H::Request;
    type Response = H::Response;

    fn spawn(&self, id: usize) -> Result<WorkerLink<H::Request, H::Response>, WorkerError> {
        let (outbound, to_worker) = mpsc::unbounded_channel();
        let (from_worker, inbound) = mpsc::unbounded_channel();
        let kill = CancellationToken::new();

        let handler = self.handler.clone();
        let token = kill.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(target: "workers", worker = id, "Local worker killed");
                }
                _ = serve(&handler, id, to_worker, from_worker) => {}
            }
        });

        Ok(WorkerLink { outbound, inbound, kill })
    }
}
