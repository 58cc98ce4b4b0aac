//! The parent/worker wire protocol.

use serde::{Deserialize, Serialize};

/// A message from the parent to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum ParentMessage<Req> {
    /// Run a task.
    Execute(Req),
    /// Stop after the current task.
    End,
}

/// A message from a worker to the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum WorkerMessage<Resp> {
    /// The worker is ready to accept tasks.
    Ready,
    /// A log event raised inside the worker.
    Log(LogRecord),
    /// A statistic raised inside the worker.
    Stats(StatRecord),
    /// The result of the task in flight.
    Result(Resp),
    /// The task in flight failed.
    Error(TaskFailure),
}

/// Why a task failed, as reported by the worker that ran it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// The failure.
    pub reason: String,
    /// Whether the parent should stop rather than retry the task.
    #[serde(default)]
    pub fatal: bool,
}

impl TaskFailure {
    /// A failure that retrying may fix.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), fatal: false }
    }

    /// A failure the parent cannot proceed past.
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), fatal: true }
    }
}

impl From<String> for TaskFailure {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

impl From<&str> for TaskFailure {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

/// The level of a forwarded log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error.
    Error,
    /// Warn.
    Warn,
    /// Info.
    Info,
    /// Debug.
    Debug,
    /// Trace.
    Trace,
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Self::Error,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::INFO => Self::Info,
            tracing::Level::DEBUG => Self::Debug,
            _ => Self::Trace,
        }
    }
}

/// A log event forwarded from a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// The event level.
    pub level: LogLevel,
    /// The target the event was raised under.
    pub target: String,
    /// The message, followed by the event's fields as `key=value`.
    pub message: String,
}

/// A named statistic forwarded from a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    /// The statistic name.
    pub name: String,
    /// The value.
    pub value: f64,
}

/// Something that happened inside the pool, broadcast to [`WorkerPool::events`] subscribers.
///
/// [`WorkerPool::events`]: crate::WorkerPool::events
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    /// A worker logged.
    Log {
        /// The worker id.
        worker: usize,
        /// The log event.
        record: LogRecord,
    },
    /// A worker reported a statistic.
    Stats {
        /// The worker id.
        worker: usize,
        /// The statistic.
        record: StatRecord,
    },
    /// A worker left the pool.
    Exited {
        /// The worker id.
        worker: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let execute = ParentMessage::Execute(7u64);
        assert_eq!(serde_json::to_string(&execute).unwrap(), r#"{"kind":"execute","body":7}"#);
        assert_eq!(serde_json::to_string(&ParentMessage::<u64>::End).unwrap(), r#"{"kind":"end"}"#);

        let ready: WorkerMessage<u64> = serde_json::from_str(r#"{"kind":"ready"}"#).unwrap();
        assert_eq!(ready, WorkerMessage::Ready);
        let log: WorkerMessage<u64> = serde_json::from_str(
            r#"{"kind":"log","body":{"level":"warn","target":"sources","message":"retrying"}}"#,
        )
        .unwrap();
        assert!(matches!(log, WorkerMessage::Log(LogRecord { level: LogLevel::Warn, .. })));

        let error = WorkerMessage::<u64>::Error(TaskFailure::fatal("no peers"));
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"kind":"error","body":{"reason":"no peers","fatal":true}}"#
        );
        let unflagged: WorkerMessage<u64> =
            serde_json::from_str(r#"{"kind":"error","body":{"reason":"timeout"}}"#).unwrap();
        assert_eq!(unflagged, WorkerMessage::Error(TaskFailure::new("timeout")));
    }
}
