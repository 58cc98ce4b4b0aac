//! Worker Subcommand

use crate::flags::{GlobalArgs, UpstreamArgs};
use clap::Parser;
use tracing_subscriber::{EnvFilter, prelude::*};
use weave_cli::verbosity_level;
use weave_sync::ImportHandler;
use weave_workers::{ForwardLayer, run_stdio_worker};

/// The `worker` Subcommand
///
/// Spawned by `sync` once per process worker. Tasks arrive on stdin and results leave on stdout,
/// one JSON message per line; log events travel the same way.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Where blocks and transactions are fetched from.
    #[command(flatten)]
    pub upstream: UpstreamArgs,
    /// The id the parent assigned to this worker.
    #[arg(long = "worker-id")]
    pub worker_id: usize,
}

impl WorkerCommand {
    /// Serves tasks until the parent ends the worker or closes stdin.
    pub async fn run(self, global: GlobalArgs) -> anyhow::Result<()> {
        let (layer, logs) = ForwardLayer::channel();
        let filter = EnvFilter::builder()
            .with_default_directive(verbosity_level(global.log_args.level).into())
            .from_env_lossy();
        tracing_subscriber::registry().with(filter).with(layer).try_init()?;

        // Interrupts reach the whole process group; the parent decides when workers stop.
        tokio::spawn(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                debug!(target: "workers", %err, "Failed to listen for ctrl-c");
            }
        });

        let upstream = self.upstream.build()?;
        run_stdio_worker(ImportHandler::new(upstream), self.worker_id, logs).await?;
        Ok(())
    }
}
