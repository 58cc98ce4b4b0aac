//! Child process workers.

use crate::{ParentMessage, Spawner, WorkerError, WorkerLink, WorkerMessage};
use futures::{SinkExt, StreamExt};
use serde::{Serialize, de::DeserializeOwned};
use std::{ffi::OsString, marker::PhantomData, path::PathBuf, process::Stdio};
use tokio::{process::Command, sync::mpsc};
use tokio_util::{
    codec::{FramedRead, FramedWrite, LinesCodec},
    sync::CancellationToken,
};

/// Starts each worker as a child process speaking the protocol over its stdio.
///
/// The child is invoked as `program [args..] --worker-id <id>`. Its stderr is inherited.
pub struct ProcessSpawner<Req, Resp> {
    program: PathBuf,
    args: Vec<OsString>,
    _marker: PhantomData<fn() -> (Req, Resp)>,
}

impl<Req, Resp> std::fmt::Debug for ProcessSpawner<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSpawner")
            .field("program", &self.program)
            .field("args", &self.args)
            .finish()
    }
}

impl<Req, Resp> ProcessSpawner<Req, Resp> {
    /// Creates a spawner running `program` with `args`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self { program: program.into(), args, _marker: PhantomData }
    }

    /// Creates a spawner that re-executes the current binary with `args`.
    pub fn current_exe(args: Vec<OsString>) -> Result<Self, WorkerError> {
        Ok(Self::new(std::env::current_exe()?, args))
    }
}

impl<Req, Resp> Spawner for ProcessSpawner<Req, Resp>
where
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    type Request = Req;
    type Response = Resp;

    fn spawn(&self, id: usize) -> Result<WorkerLink<Req, Resp>, WorkerError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--worker-id")
            .arg(id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| WorkerError::Spawn { id, reason: err.to_string() })?;
        let missing = |pipe: &str| WorkerError::Spawn { id, reason: format!("no {pipe} pipe") };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

        let (outbound, mut to_worker) = mpsc::unbounded_channel::<ParentMessage<Req>>();
        let (from_worker, inbound) = mpsc::unbounded_channel();
        let kill = CancellationToken::new();

        tokio::spawn(async move {
            let mut sink = FramedWrite::new(stdin, LinesCodec::new());
            while let Some(message) = to_worker.recv().await {
                let line = match serde_json::to_string(&message) {
                    Ok(line) => line,
                    Err(err) => {
                        error!(target: "workers", worker = id, %err, "Failed to encode message");
                        continue;
                    }
                };
                if let Err(err) = sink.send(line).await {
                    debug!(target: "workers", worker = id, %err, "Worker stdin closed");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = FramedRead::new(stdout, LinesCodec::new());
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(target: "workers", worker = id, %err, "Worker stdout failed");
                        break;
                    }
                };
                match serde_json::from_str::<WorkerMessage<Resp>>(&line) {
                    Ok(message) => {
                        if from_worker.send(message).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(target: "workers", worker = id, %err, "Ignoring malformed worker output");
                    }
                }
            }
        });

        let token = kill.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => {
                        debug!(target: "workers", worker = id, "Worker process exited");
                    }
                    Ok(status) => warn!(target: "workers", worker = id, %status, "Worker process failed"),
                    Err(err) => warn!(target: "workers", worker = id, %err, "Failed to wait on worker"),
                },
                _ = token.cancelled() => {
                    warn!(target: "workers", worker = id, "Killing worker process");
                    if let Err(err) = child.kill().await {
                        warn!(target: "workers", worker = id, %err, "Failed to kill worker");
                    }
                }
            }
        });

        info!(target: "workers", worker = id, program = %self.program.display(), "Spawned worker process");
        Ok(WorkerLink { outbound, inbound, kill })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// A shell script standing in for a worker binary: it announces readiness and echoes one
    /// result per request line, then exits when told to end.
    const ECHO_WORKER: &str = r#"
printf '{"kind":"ready"}\n'
while read -r line; do
  case "$line" in
    *'"end"'*) exit 0 ;;
    *) printf '{"kind":"result","body":1}\n' ;;
  esac
done
"#;

    #[tokio::test]
    async fn test_process_worker_roundtrip() {
        let spawner = ProcessSpawner::<u64, u64>::new(
            "sh",
            vec!["-c".into(), ECHO_WORKER.into(), "worker".into()],
        );
        let mut link = spawner.spawn(0).unwrap();
        assert_eq!(link.inbound.recv().await, Some(WorkerMessage::Ready));
        link.outbound.send(ParentMessage::Execute(5)).unwrap();
        assert_eq!(link.inbound.recv().await, Some(WorkerMessage::Result(1)));
        link.outbound.send(ParentMessage::End).unwrap();
        assert_eq!(link.inbound.recv().await, None);
    }

    #[tokio::test]
    async fn test_killed_process_closes_link() {
        let spawner = ProcessSpawner::<u64, u64>::new("sh", vec!["-c".into(), "sleep 30".into()]);
        let mut link = spawner.spawn(1).unwrap();
        link.kill.cancel();
        assert_eq!(link.inbound.recv().await, None);
    }
}
