//! The worker side task interface.

use crate::{StatRecord, TaskFailure};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use tokio::sync::mpsc;

/// Runs the tasks a worker is asked to execute.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// The task description sent by the parent.
    type Request: Serialize + DeserializeOwned + Debug + Send + 'static;
    /// The task result sent back.
    type Response: Serialize + DeserializeOwned + Debug + Send + 'static;

    /// Runs one task. An `Err` is reported to the parent as a failed task; the worker keeps
    /// serving. A [fatal](TaskFailure::fatal) failure tells the parent not to retry.
    async fn handle(
        &self,
        ctx: &WorkerContext,
        request: Self::Request,
    ) -> Result<Self::Response, TaskFailure>;
}

/// Per-worker context handed to every task.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    id: usize,
    stats: mpsc::UnboundedSender<StatRecord>,
}

impl WorkerContext {
    pub(crate) const fn new(id: usize, stats: mpsc::UnboundedSender<StatRecord>) -> Self {
        Self { id, stats }
    }

    /// The worker id.
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Reports a statistic to the parent.
    pub fn stat(&self, name: impl Into<String>, value: f64) {
        let _ = self.stats.send(StatRecord { name: name.into(), value });
    }
}
