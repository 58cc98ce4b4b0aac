//! Resolves queued path manifests.

use crate::{ImportPool, ImportRequest, ImportResponse, ManifestResult, Metrics, SyncActor, SyncError};
use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tokio::{select, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use weave_storage::{GatewayStore, tables::ManifestState};

/// Settings of the [`ManifestSweeper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// How often the queue is swept.
    pub interval: Duration,
    /// Manifests per worker task.
    pub batch_size: usize,
    /// Failed attempts after which a manifest is given up on.
    pub max_attempts: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(5), batch_size: 16, max_attempts: 3 }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Manifests stored.
    pub parsed: usize,
    /// Manifests left pending for another attempt.
    pub retried: usize,
    /// Manifests given up on.
    pub failed: usize,
}

/// Hands pending manifests from the queue to the manifest pool and records the outcomes.
#[derive(Debug)]
pub struct ManifestSweeper {
    config: SweeperConfig,
    store: GatewayStore,
    pool: ImportPool,
    cancellation: CancellationToken,
}

impl ManifestSweeper {
    /// Creates a sweeper.
    pub const fn new(
        config: SweeperConfig,
        store: GatewayStore,
        pool: ImportPool,
        cancellation: CancellationToken,
    ) -> Self {
        Self { config, store, pool, cancellation }
    }

    /// Resolves one round of pending manifests, one batch per worker.
    pub async fn sweep_once(&self) -> Result<SweepReport, SyncError> {
        let batch_size = self.config.batch_size.max(1);
        let pending =
            self.store.pending_manifests(batch_size * self.pool.size().max(1)).await?;
        let mut report = SweepReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let tasks = pending.chunks(batch_size).map(|batch| {
            let tx_ids = batch.iter().map(|entry| entry.tx_id.clone()).collect();
            self.pool.schedule(ImportRequest::ImportManifests { tx_ids })
        });
        for (batch, result) in pending.chunks(batch_size).zip(join_all(tasks).await) {
            let outcomes = match result {
                Ok(ImportResponse::Manifests { outcomes }) => outcomes,
                Ok(_) => return Err(SyncError::UnexpectedResponse("import_manifests")),
                Err(err) if err.is_worker_lost() => return Err(err.into()),
                Err(err) => {
                    warn!(target: "manifest", %err, size = batch.len(), "Manifest batch failed");
                    continue;
                }
            };

            for (entry, outcome) in batch.iter().zip(outcomes) {
                let reason = match outcome.result {
                    ManifestResult::Parsed(manifest) => {
                        self.store.save_manifest(&entry.tx_id, manifest).await?;
                        debug!(target: "manifest", tx = %entry.tx_id, "Stored manifest");
                        weave_macros::inc!(counter, Metrics::MANIFESTS, "outcome", "parsed");
                        report.parsed += 1;
                        continue;
                    }
                    ManifestResult::Malformed(reason) | ManifestResult::Unavailable(reason) => {
                        reason
                    }
                };
                match self
                    .store
                    .record_manifest_failure(entry, &reason, self.config.max_attempts)
                    .await?
                {
                    ManifestState::Pending => report.retried += 1,
                    ManifestState::Failed => {
                        weave_macros::inc!(counter, Metrics::MANIFESTS, "outcome", "failed");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            target: "manifest",
            parsed = report.parsed,
            retried = report.retried,
            failed = report.failed,
            "Swept manifest queue"
        );
        Ok(report)
    }

    async fn run(&self) -> Result<(), SyncError> {
        self.pool.wait_ready().await?;
        let cancellation = self.cancellation.clone();
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            select! {
                biased;
                _ = cancellation.cancelled() => {
                    info!(target: "manifest", "Received shutdown signal. Stopping the manifest sweeper.");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        if err.is_fatal() {
                            return Err(err);
                        }
                        warn!(target: "manifest", %err, "Manifest sweep failed");
                    }
                }
            }
        }
    }
}

#[async_trait]
impl SyncActor for ManifestSweeper {
    type Error = SyncError;
    type StartData = ();

    async fn start(self, _: ()) -> Result<(), SyncError> {
        let result = self.run().await;
        self.pool.end().await;
        if let Err(err) = &result {
            error!(target: "manifest", %err, "Manifest sweeper stopped");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImportHandler;
    use std::sync::Arc;
    use weave_protocol::{MANIFEST_CONTENT_TYPE, Tag, Transaction};
    use weave_sources::TestUpstream;
    use weave_storage::{ManifestDetector, MemoryStore};
    use weave_workers::{LocalSpawner, WorkerPool};

    const GOOD: &[u8] = br#"{"manifest":"arweave/paths","version":"0.1.0","paths":{"index.html":{"id":"x"}}}"#;

    fn manifest(id: &str) -> Transaction {
        Transaction {
            id: id.into(),
            tags: vec![Tag::from_utf8("Content-Type", MANIFEST_CONTENT_TYPE)],
            ..Default::default()
        }
    }

    async fn sweeper(upstream: TestUpstream) -> ManifestSweeper {
        let store = GatewayStore::new(Arc::new(MemoryStore::new()))
            .with_processor(Arc::new(ManifestDetector));
        store.init().await.unwrap();
        let block = upstream.block_at(1).unwrap();
        for (position, id) in block.txs.iter().enumerate() {
            let tx = upstream.transaction(id).unwrap();
            store.import_transaction(1, 1_000 + position as u64, &tx, &block, None).await.unwrap();
        }
        let pool = WorkerPool::spawn(&LocalSpawner::new(ImportHandler::new(upstream)), 1).unwrap();
        pool.wait_ready().await.unwrap();
        let config = SweeperConfig { batch_size: 4, ..Default::default() };
        ManifestSweeper::new(config, store, pool, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_sweep_stores_manifests_and_gives_up_on_bad_ones() {
        let upstream = TestUpstream::with_chain(1, 0);
        upstream.set_data("good", GOOD, 32);
        upstream.set_data("bad", b"<html>", 32);
        upstream.push_block("main", vec![manifest("good"), manifest("bad"), manifest("gone")]);
        let sweeper = sweeper(upstream).await;

        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report, SweepReport { parsed: 1, retried: 2, failed: 0 });
        let stored = sweeper.store.get_manifest("good").await.unwrap().unwrap();
        assert_eq!(stored.manifest.paths.len(), 1);

        sweeper.sweep_once().await.unwrap();
        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report, SweepReport { parsed: 0, retried: 0, failed: 2 });
        assert!(sweeper.store.pending_manifests(10).await.unwrap().is_empty());
        assert_eq!(sweeper.store.failed_manifests(10).await.unwrap().len(), 2);

        assert_eq!(sweeper.sweep_once().await.unwrap(), SweepReport::default());
        sweeper.pool.end().await;
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_cancellation() {
        let sweeper = sweeper({
            let upstream = TestUpstream::with_chain(1, 0);
            upstream.push_block("main", vec![]);
            upstream
        })
        .await;
        let cancellation = sweeper.cancellation.clone();
        let pool = sweeper.pool.clone();
        let task = tokio::spawn(sweeper.start(()));
        cancellation.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(pool.status().live, 0);
    }
}
