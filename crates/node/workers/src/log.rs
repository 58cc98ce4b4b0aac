//! Log forwarding between workers and the parent.

use crate::{LogLevel, LogRecord};
use std::fmt::{self, Write as _};
use tokio::sync::mpsc;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::layer::{Context, Layer};

/// A [`Layer`] that turns every event into a [`LogRecord`] and sends it down a channel.
///
/// Installed inside worker processes, whose stdout carries the protocol and must not receive
/// human readable logs.
#[derive(Debug, Clone)]
pub struct ForwardLayer {
    records: mpsc::UnboundedSender<LogRecord>,
}

impl ForwardLayer {
    /// Creates the layer and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LogRecord>) {
        let (records, rx) = mpsc::unbounded_channel();
        (Self { records }, rx)
    }
}

impl<S: Subscriber> Layer<S> for ForwardLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        let _ = self.records.send(LogRecord {
            level: (*metadata.level()).into(),
            target: metadata.target().to_string(),
            message: visitor.finish(),
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(mut self) -> String {
        if !self.fields.is_empty() {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message.push_str(&self.fields);
        }
        self.message
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

/// Re-emits a forwarded record in the parent under the `workers` target.
pub(crate) fn emit(worker: usize, record: &LogRecord) {
    let LogRecord { level, target, message } = record;
    match level {
        LogLevel::Error => error!(target: "workers", worker, origin = %target, "{message}"),
        LogLevel::Warn => warn!(target: "workers", worker, origin = %target, "{message}"),
        LogLevel::Info => info!(target: "workers", worker, origin = %target, "{message}"),
        LogLevel::Debug => debug!(target: "workers", worker, origin = %target, "{message}"),
        LogLevel::Trace => trace!(target: "workers", worker, origin = %target, "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_forwards_events_with_fields() {
        let (layer, mut rx) = ForwardLayer::channel();
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            warn!(target: "sources", attempt = 3, peer = "http://a", "Retrying upstream request");
        });
        let record = rx.try_recv().unwrap();
        assert_eq!(record.level, LogLevel::Warn);
        assert_eq!(record.target, "sources");
        assert_eq!(record.message, "Retrying upstream request attempt=3 peer=http://a");
    }
}
