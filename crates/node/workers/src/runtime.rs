//! The worker side loop.

use crate::{LogRecord, ParentMessage, TaskHandler, WorkerContext, WorkerError, WorkerMessage};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

/// Serves tasks from `inbound` until the parent sends [`ParentMessage::End`] or hangs up.
///
/// Announces readiness first, then answers every `Execute` with exactly one `Result` or `Error`.
/// Statistics a task reports are flushed before its answer.
pub async fn serve<H: TaskHandler>(
    handler: &H,
    id: usize,
    mut inbound: mpsc::UnboundedReceiver<ParentMessage<H::Request>>,
    outbound: mpsc::UnboundedSender<WorkerMessage<H::Response>>,
) {
    let (stats_tx, mut stats_rx) = mpsc::unbounded_channel();
    let ctx = WorkerContext::new(id, stats_tx);
    if outbound.send(WorkerMessage::Ready).is_err() {
        return;
    }

    while let Some(message) = inbound.recv().await {
        let request = match message {
            ParentMessage::Execute(request) => request,
            ParentMessage::End => {
                debug!(target: "workers", worker = id, "Received end, stopping");
                break;
            }
        };
        let result = handler.handle(&ctx, request).await;
        while let Ok(stat) = stats_rx.try_recv() {
            let _ = outbound.send(WorkerMessage::Stats(stat));
        }
        let answer = match result {
            Ok(response) => WorkerMessage::Result(response),
            Err(failure) => WorkerMessage::Error(failure),
        };
        if outbound.send(answer).is_err() {
            break;
        }
    }
}

/// Runs a worker over the process's stdin/stdout.
///
/// `logs` is the receiving end of a [`ForwardLayer`](crate::ForwardLayer) installed as the
/// process's subscriber; its records are interleaved with the protocol messages on stdout.
pub async fn run_stdio_worker<H: TaskHandler>(
    handler: H,
    id: usize,
    mut logs: mpsc::UnboundedReceiver<LogRecord>,
) -> Result<(), WorkerError>
where
    H::Response: Sync,
{
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WorkerMessage<H::Response>>();

    let reader = tokio::spawn(async move {
        let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    error!(target: "workers", %err, "Failed to read from parent");
                    break;
                }
            };
            match serde_json::from_str::<ParentMessage<H::Request>>(&line) {
                Ok(message) => {
                    if inbound_tx.send(message).is_err() {
                        break;
                    }
                }
                Err(err) => warn!(target: "workers", %err, "Ignoring malformed parent message"),
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut sink = FramedWrite::new(tokio::io::stdout(), LinesCodec::new());
        loop {
            let message = tokio::select! {
                biased;
                message = outbound_rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                Some(record) = logs.recv() => WorkerMessage::Log(record),
            };
            write_message(&mut sink, &message).await?;
        }
        while let Ok(record) = logs.try_recv() {
            write_message(&mut sink, &WorkerMessage::<H::Response>::Log(record)).await?;
        }
        Ok::<_, WorkerError>(())
    });

    serve(&handler, id, inbound_rx, outbound_tx).await;
    reader.abort();
    writer.await.map_err(|err| WorkerError::Codec(err.to_string()))?
}

async fn write_message<W, Resp>(
    sink: &mut FramedWrite<W, LinesCodec>,
    message: &WorkerMessage<Resp>,
) -> Result<(), WorkerError>
where
    W: tokio::io::AsyncWrite + Unpin,
    Resp: serde::Serialize,
{
    let line = serde_json::to_string(message).map_err(|err| WorkerError::Codec(err.to_string()))?;
    sink.send(line).await.map_err(|err| WorkerError::Codec(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskFailure;
    use async_trait::async_trait;

    #[derive(Debug, Clone)]
    struct Doubler;

    #[async_trait]
    impl TaskHandler for Doubler {
        type Request = u64;
        type Response = u64;

        async fn handle(&self, ctx: &WorkerContext, request: u64) -> Result<u64, TaskFailure> {
            ctx.stat("doubled", 1.0);
            match request {
                0 => return Err("zero".into()),
                u64::MAX => return Err(TaskFailure::fatal("overflow")),
                _ => {}
            }
            Ok(request * 2)
        }
    }

    #[tokio::test]
    async fn test_serve_answers_every_execute() {
        let (to_worker, inbound) = mpsc::unbounded_channel();
        let (outbound, mut from_worker) = mpsc::unbounded_channel();
        to_worker.send(ParentMessage::Execute(21)).unwrap();
        to_worker.send(ParentMessage::Execute(0)).unwrap();
        to_worker.send(ParentMessage::Execute(u64::MAX)).unwrap();
        to_worker.send(ParentMessage::End).unwrap();
        to_worker.send(ParentMessage::Execute(1)).unwrap();

        serve(&Doubler, 0, inbound, outbound).await;

        let mut messages = Vec::new();
        while let Some(message) = from_worker.recv().await {
            messages.push(message);
        }
        let stat = WorkerMessage::Stats(crate::StatRecord { name: "doubled".into(), value: 1.0 });
        assert_eq!(
            messages,
            vec![
                WorkerMessage::Ready,
                stat.clone(),
                WorkerMessage::Result(42),
                stat.clone(),
                WorkerMessage::Error(TaskFailure::new("zero")),
                stat,
                WorkerMessage::Error(TaskFailure::fatal("overflow")),
            ]
        );
    }
}
