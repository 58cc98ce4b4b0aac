//! The sync orchestrator.

use crate::{
    BlockWriter, Doctor, HashListCache, ImportCode, ImportPool, ImportRequest, ImportResponse,
    Metrics, SyncActor, SyncError, SyncPhase, SyncStateHandle,
};
use async_trait::async_trait;
use futures::{StreamExt, stream::FuturesUnordered};
use std::{
    collections::VecDeque,
    fmt,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{select, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use weave_protocol::Block;
use weave_sources::UpstreamClient;
use weave_storage::{GatewayStore, tables::GatewayStatusRecord};
use weave_workers::WorkerError;

/// The default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Settings of the [`SyncOrchestrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// The store namespace, recorded in the status row.
    pub keyspace: String,
    /// How often upstream is polled for a new head.
    pub poll_interval: Duration,
    /// Caps the synced heights and disables polling.
    pub sync_length: Option<u64>,
    /// How often a height answering [`ImportCode::Requeue`] is retried during catch-up.
    pub max_requeues: usize,
    /// How many doctor passes catch-up runs before giving up.
    pub max_rounds: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            keyspace: "gateway".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            sync_length: None,
            max_requeues: 5,
            max_rounds: 10,
        }
    }
}

/// How a batch of heights went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Heights written.
    pub imported: usize,
    /// Heights upstream has another block at.
    pub dequeued: usize,
    /// Whether dispatch stopped early on shutdown.
    pub cancelled: bool,
}

/// Drives the gateway from an empty or partial store to the upstream tip and keeps it there.
///
/// The orchestrator moves through [`SyncPhase::Bootstrapping`], [`SyncPhase::CatchingUp`] and
/// [`SyncPhase::Polling`]; fork recovery pauses polling. Workers of the [`ImportPool`] fetch
/// blocks, the orchestrator writes them. Cancellation stops new dispatch but every fetched block
/// is written in full before the orchestrator returns.
pub struct SyncOrchestrator {
    config: SyncConfig,
    store: GatewayStore,
    upstream: Arc<dyn UpstreamClient>,
    pool: ImportPool,
    doctor: Doctor,
    writer: BlockWriter,
    hash_lists: HashListCache,
    state: SyncStateHandle,
    cancellation: CancellationToken,
    hashes: Vec<String>,
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("hashes", &self.hashes.len())
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Creates an orchestrator. `hash_lists` should carry the same cap as
    /// [`SyncConfig::sync_length`].
    pub fn new(
        config: SyncConfig,
        store: GatewayStore,
        upstream: Arc<dyn UpstreamClient>,
        pool: ImportPool,
        hash_lists: HashListCache,
        state: SyncStateHandle,
        cancellation: CancellationToken,
    ) -> Self {
        let doctor = Doctor::new(store.clone(), Arc::clone(&upstream));
        let writer = BlockWriter::new(store.clone());
        Self {
            config,
            store,
            upstream,
            pool,
            doctor,
            writer,
            hash_lists,
            state,
            cancellation,
            hashes: Vec::new(),
        }
    }

    /// The shared state.
    pub const fn state(&self) -> &SyncStateHandle {
        &self.state
    }

    /// The hash list the orchestrator works from.
    pub fn hashes(&self) -> &[String] {
        &self.hashes
    }

    /// Waits for the workers, loads the hash list and records where the store stands. Returns
    /// whether the store is empty.
    pub async fn bootstrap(&mut self) -> Result<bool, SyncError> {
        self.state.set_phase(SyncPhase::Bootstrapping);
        self.pool.wait_ready().await?;
        for result in self.pool.schedule_all(ImportRequest::Prime).await {
            if let Err(err) = result {
                if err.is_fatal() {
                    return Err(err.into());
                }
                warn!(target: "sync", %err, "Worker failed to prime");
            }
        }

        self.hashes = self.hash_lists.refresh(&*self.upstream).await?;
        let upstream_height = self.hashes.len().saturating_sub(1) as u64;
        self.state.set_upstream_height(upstream_height);
        weave_macros::set!(gauge, Metrics::UPSTREAM_HEIGHT, upstream_height);

        let first_run = self.store.is_empty().await?;
        if first_run {
            info!(target: "sync", heights = self.hashes.len(), "Starting from an empty store");
        } else {
            self.record_stored_top().await?;
            let check = self.doctor.gap_check(self.hashes.len() as u64).await?;
            info!(
                target: "sync",
                stored_top = ?check.stored_top,
                expected = check.expected,
                maybe_missing = check.maybe_missing,
                "Resuming"
            );
        }
        Ok(first_run)
    }

    /// Imports every height the store is missing until the doctor finds no gaps. Returns `false`
    /// if shutdown interrupted it.
    pub async fn catch_up(&mut self, first_run: bool) -> Result<bool, SyncError> {
        self.state.set_phase(SyncPhase::CatchingUp);
        let mut missing = if first_run {
            (0..self.hashes.len() as u64).collect()
        } else {
            self.doctor.find_missing_blocks(self.hashes.len() as u64).await?
        };

        let mut round = 0;
        while !missing.is_empty() {
            round += 1;
            if round > self.config.max_rounds {
                error!(target: "sync", rounds = self.config.max_rounds, remaining = missing.len(), "Catch-up stalled");
                return Err(SyncError::Stalled(self.config.max_rounds));
            }
            info!(
                target: "sync",
                round,
                missing = missing.len(),
                first = missing[0],
                last = missing[missing.len() - 1],
                "Catching up"
            );

            let report = self.import_heights(missing).await?;
            if report.cancelled {
                info!(target: "sync", imported = report.imported, "Catch-up interrupted by shutdown");
                return Ok(false);
            }
            if report.dequeued > 0 {
                info!(target: "sync", dequeued = report.dequeued, "Hash list is stale, refreshing");
                self.hashes = self.hash_lists.refresh(&*self.upstream).await?;
            }
            missing = self.doctor.find_missing_blocks(self.hashes.len() as u64).await?;
        }

        self.record_stored_top().await?;
        info!(target: "sync", height = self.state.snapshot().gateway_height, "Caught up");
        Ok(true)
    }

    /// Imports `heights` with at most one task per worker in flight.
    ///
    /// Heights may land in any order. The first write or worker failure aborts the batch; a
    /// height still incomplete after [`SyncConfig::max_requeues`] retries does too.
    pub async fn import_heights(&self, heights: Vec<u64>) -> Result<BatchReport, SyncError> {
        let mut queue: VecDeque<(u64, usize)> = heights.into_iter().map(|h| (h, 0)).collect();
        let mut in_flight = FuturesUnordered::new();
        let mut report = BatchReport::default();
        let limit = self.pool.size().max(1);

        loop {
            while in_flight.len() < limit && !self.cancellation.is_cancelled() {
                let Some((height, requeues)) = queue.pop_front() else { break };
                let Some(expected_hash) = self.expected_hash(height) else {
                    warn!(target: "sync", height, "Height beyond the hash list, skipping");
                    continue;
                };
                self.state.begin(height);
                let pool = self.pool.clone();
                in_flight.push(async move {
                    let request = ImportRequest::ImportBlock { height, expected_hash };
                    (height, requeues, pool.schedule(request).await)
                });
            }

            let Some((height, requeues, result)) = in_flight.next().await else { break };
            match self.land(height, result).await? {
                ImportCode::Ok => report.imported += 1,
                ImportCode::Dequeue => report.dequeued += 1,
                ImportCode::Requeue if requeues >= self.config.max_requeues => {
                    return Err(SyncError::RequeueExhausted { height, attempts: requeues + 1 });
                }
                ImportCode::Requeue => queue.push_back((height, requeues + 1)),
            }
        }

        report.cancelled = self.cancellation.is_cancelled() && !queue.is_empty();
        Ok(report)
    }

    /// Imports one height and returns its code.
    pub async fn import_height(&self, height: u64, expected_hash: String) -> Result<ImportCode, SyncError> {
        self.state.begin(height);
        let result = self.pool.schedule(ImportRequest::ImportBlock { height, expected_hash }).await;
        self.land(height, result).await
    }

    /// Writes the outcome of a fetch.
    async fn land(
        &self,
        height: u64,
        result: Result<ImportResponse, WorkerError>,
    ) -> Result<ImportCode, SyncError> {
        let import = match result {
            Ok(ImportResponse::Block(import)) => import,
            Ok(_) => {
                self.state.finish(height, 0, None);
                return Err(SyncError::UnexpectedResponse("import_block"));
            }
            Err(err) => {
                self.state.finish(height, 0, None);
                return Err(err.into());
            }
        };

        let code = import.code;
        let txs = import.transactions.len() as u64;
        self.state.writing(txs);
        let written = self.writer.apply(import).await;
        match written {
            Ok(Some(block)) => {
                self.state.finish(height, txs, Some(&block.indep_hash));
                weave_macros::inc!(counter, Metrics::BLOCKS_IMPORTED);
                weave_macros::set!(gauge, Metrics::GATEWAY_HEIGHT, self.state.snapshot().gateway_height);
                self.save_status().await;
            }
            Ok(None) => {
                self.state.finish(height, txs, None);
                debug!(target: "sync", height, %code, "Height not imported");
                weave_macros::inc!(counter, Metrics::HEIGHTS_REQUEUED, "code", code.to_string());
            }
            Err(err) => {
                self.state.finish(height, txs, None);
                error!(target: "sync", height, %err, "Failed to write block");
                return Err(err.into());
            }
        }
        Ok(code)
    }

    /// Follows the upstream head until cancelled.
    pub async fn poll(&mut self) -> Result<(), SyncError> {
        self.state.set_phase(SyncPhase::Polling);
        let cancellation = self.cancellation.clone();
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            select! {
                biased;
                _ = cancellation.cancelled() => {
                    info!(target: "sync", "Received shutdown signal. Stopping polling.");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if let Err(err) = self.poll_once().await {
                        if err.is_fatal() {
                            error!(target: "sync", %err, "Polling failed");
                            return Err(err);
                        }
                        warn!(target: "sync", %err, "Poll failed, retrying on the next tick");
                    }
                }
            }
        }
    }

    /// Checks upstream for a new head once and imports it.
    pub async fn poll_once(&mut self) -> Result<(), SyncError> {
        let info = self.upstream.fetch_info().await?;
        self.state.set_upstream_height(info.height);
        weave_macros::set!(gauge, Metrics::UPSTREAM_HEIGHT, info.height);

        let top = self.state.top();
        if top.as_ref().is_some_and(|(_, hash)| *hash == info.current) {
            trace!(target: "sync", height = info.height, "No new head");
            return Ok(());
        }

        let head = self.upstream.fetch_block_by_hash(&info.current).await?;
        match top {
            Some((height, hash)) if head.previous_block == hash && head.height == height + 1 => {
                debug!(target: "sync", height = head.height, hash = %head.indep_hash, "New head");
                self.import_chain(vec![head]).await
            }
            Some(_) => self.recover_fork(head).await,
            None => {
                info!(target: "sync", "Store is empty, catching up again");
                self.hashes = self.hash_lists.refresh(&*self.upstream).await?;
                self.catch_up(true).await?;
                self.state.set_phase(SyncPhase::Polling);
                Ok(())
            }
        }
    }

    /// Reconciles the store with a `head` that does not extend the recorded top, then imports
    /// the new branch. No other height is imported meanwhile.
    async fn recover_fork(&mut self, head: Block) -> Result<(), SyncError> {
        self.state.set_phase(SyncPhase::PausedForForkRecovery);
        let result = self.reconcile(head).await;
        self.state.set_phase(SyncPhase::Polling);
        result
    }

    async fn reconcile(&mut self, head: Block) -> Result<(), SyncError> {
        let resolution = self.doctor.resolve_fork(head).await?;
        if !resolution.rolled_back.is_empty() {
            let fork_point = resolution.fork_point;
            let hash = self.store.block_hash_at(fork_point).await?;
            self.state.set_top(fork_point, hash);
            self.save_status().await;
        }
        self.import_chain(resolution.new_chain).await?;
        if let Err(err) = self.hash_lists.save(&self.hashes).await {
            warn!(target: "sync", %err, "Failed to save the hash list");
        }
        Ok(())
    }

    /// Imports `blocks` in ascending order, stopping at the first one that does not land.
    async fn import_chain(&mut self, blocks: Vec<Block>) -> Result<(), SyncError> {
        for block in blocks {
            self.record_hash(block.height, &block.indep_hash);
            let height = block.height;
            let code = self.import_height(height, block.indep_hash).await?;
            if code != ImportCode::Ok {
                info!(target: "sync", height, %code, "Head not imported, retrying on the next tick");
                break;
            }
        }
        Ok(())
    }

    fn record_hash(&mut self, height: u64, hash: &str) {
        let Ok(index) = usize::try_from(height) else { return };
        self.hashes.truncate(index);
        if self.hashes.len() == index {
            self.hashes.push(hash.to_string());
        }
    }

    fn expected_hash(&self, height: u64) -> Option<String> {
        self.hashes.get(usize::try_from(height).ok()?).cloned()
    }

    async fn record_stored_top(&self) -> Result<(), SyncError> {
        if let Some(top) = self.store.max_height().await? {
            let hash = self.store.block_hash_at(top).await?;
            self.state.set_top(top, hash);
            weave_macros::set!(gauge, Metrics::GATEWAY_HEIGHT, top);
        }
        Ok(())
    }

    /// Persists the status row. Failures are logged only.
    async fn save_status(&self) {
        let state = self.state.snapshot();
        let record = GatewayStatusRecord {
            keyspace: self.config.keyspace.clone(),
            session_id: state.session_id,
            phase: state.phase.to_string(),
            gateway_height: state.gateway_height,
            arweave_height: state.upstream_height,
            top_hash: state.top_hash,
            updated_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default(),
        };
        if let Err(err) = self.store.save_status(&record).await {
            warn!(target: "sync", %err, "Failed to save the gateway status");
        }
    }

    async fn run(&mut self) -> Result<(), SyncError> {
        let first_run = self.bootstrap().await?;
        if self.cancellation.is_cancelled() || !self.catch_up(first_run).await? {
            return Ok(());
        }
        if let Some(cap) = self.config.sync_length {
            info!(target: "sync", cap, "Reached the development sync length, not polling");
            return Ok(());
        }
        self.poll().await
    }
}

#[async_trait]
impl SyncActor for SyncOrchestrator {
    type Error = SyncError;
    type StartData = ();

    async fn start(mut self, _: ()) -> Result<(), SyncError> {
        let result = self.run().await;
        self.state.set_phase(SyncPhase::Stopped);
        self.save_status().await;
        self.pool.end().await;
        if let Err(err) = &result {
            error!(target: "sync", %err, "Sync stopped");
        }
        result
    }
}
