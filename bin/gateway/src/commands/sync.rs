//! Sync Subcommand

use crate::{
    events::relay_pool_events,
    flags::{GlobalArgs, StoreArgs, UpstreamArgs, WorkerArgs},
};
use clap::Parser;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use weave_rpc::{RpcActor, RpcConfig};
use weave_sync::{
    ManifestSweeper, SweeperConfig, SyncActor, SyncConfig, SyncOrchestrator, SyncStateHandle,
};

/// The `sync` Subcommand
///
/// Imports every block of the upstream hash list, then follows the upstream head until
/// interrupted. Status is served over HTTP the whole time.
///
/// # Usage
///
/// ```sh
/// weave-gateway sync [FLAGS] [OPTIONS]
/// ```
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(about = "Imports the weave and follows the upstream head")]
pub struct SyncCommand {
    /// Where blocks and transactions are fetched from.
    #[command(flatten)]
    pub upstream: UpstreamArgs,
    /// Where indexed data lives.
    #[command(flatten)]
    pub store: StoreArgs,
    /// Worker pool sizes and isolation.
    #[command(flatten)]
    pub workers: WorkerArgs,
    /// Seconds between two polls of the upstream head.
    #[arg(long = "sync.poll-interval", env = "POLLTIME_DELAY_SECONDS", default_value_t = 5)]
    pub poll_interval: u64,
    /// Only sync this many heights and skip polling.
    #[arg(long = "sync.length", env = "DEVELOPMENT_SYNC_LENGTH")]
    pub sync_length: Option<u64>,
    /// The socket the status server binds.
    #[arg(long = "status.addr", env = "STATUS_ADDR", default_value = "0.0.0.0:3000")]
    pub status_addr: SocketAddr,
    /// Do not restart the status server when it stops.
    #[arg(long = "status.no-restart")]
    pub status_no_restart: bool,
}

impl SyncCommand {
    /// Runs the subcommand.
    pub async fn run(self, global: GlobalArgs) -> anyhow::Result<()> {
        anyhow::ensure!(self.workers.import > 0, "PARALLEL_WORKERS must be at least 1");

        let upstream = self.upstream.build()?;
        let store = self.store.open().await?;
        let state = SyncStateHandle::random();
        let cancellation = CancellationToken::new();
        info!(
            target: "sync",
            session = %state.snapshot().session_id,
            keyspace = %self.store.keyspace,
            workers = self.workers.import,
            "Starting gateway sync"
        );

        let verbosity = global.log_args.level;
        let import_pool =
            self.workers.spawn(self.workers.import, &upstream, &self.upstream, verbosity)?;
        relay_pool_events(&import_pool, "import");

        let sweeper = if self.workers.manifest > 0 {
            let pool =
                self.workers.spawn(self.workers.manifest, &upstream, &self.upstream, verbosity)?;
            relay_pool_events(&pool, "manifest");
            Some(ManifestSweeper::new(
                SweeperConfig::default(),
                store.clone(),
                pool,
                cancellation.clone(),
            ))
        } else {
            None
        };

        let config = SyncConfig {
            keyspace: self.store.keyspace.clone(),
            poll_interval: Duration::from_secs(self.poll_interval),
            sync_length: self.sync_length,
            ..Default::default()
        };
        let orchestrator = SyncOrchestrator::new(
            config,
            store,
            Arc::new(upstream),
            import_pool,
            self.store.hash_list_cache().with_cap(self.sync_length),
            state.clone(),
            cancellation.clone(),
        );

        let rpc = RpcActor::new(
            RpcConfig { socket: self.status_addr, no_restart: self.status_no_restart },
            state,
        );
        let rpc_task = tokio::spawn(rpc.start(cancellation.clone()));
        let sweeper_task = sweeper.map(|sweeper| tokio::spawn(sweeper.start(())));
        let sync_task = tokio::spawn(orchestrator.start(()));

        let signal = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(target: "sync", "Received ctrl-c. Shutting down.");
            }
            signal.cancel();
        });

        let synced = sync_task.await?;
        if synced.is_ok() && !cancellation.is_cancelled() {
            info!(target: "sync", "Sync finished. Serving status until shutdown.");
            cancellation.cancelled().await;
        }
        cancellation.cancel();

        if let Some(task) = sweeper_task {
            if let Err(err) = task.await? {
                warn!(target: "manifest", %err, "Manifest sweeper failed");
            }
        }
        if let Err(err) = rpc_task.await? {
            warn!(target: "rpc", %err, "Status server failed");
        }
        synced?;
        info!(target: "sync", "Gateway stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        sync: SyncCommand,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::parse_from(["test", "--arweave.nodes", r#"["http://a"]"#]);
        let sync = cli.sync;
        assert_eq!(sync.poll_interval, 5);
        assert_eq!(sync.sync_length, None);
        assert_eq!(sync.status_addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(sync.workers.import, 4);
        assert_eq!(sync.workers.manifest, 1);
        assert_eq!(sync.store.keyspace, "gateway");
        assert_eq!(sync.upstream.http_timeout, 15);
    }

    #[test]
    fn test_development_sync_length() {
        let cli = TestCli::parse_from([
            "test",
            "--arweave.nodes",
            "[]",
            "--sync.length",
            "100",
            "--workers.mode",
            "local",
        ]);
        assert_eq!(cli.sync.sync_length, Some(100));
        assert_eq!(cli.sync.workers.mode, crate::flags::WorkerMode::Local);
    }
}
