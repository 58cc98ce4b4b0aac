//! End to end sync scenarios against an in-memory upstream and store.

use std::{sync::Arc, time::Duration};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use weave_sources::TestUpstream;
use weave_storage::{GatewayStore, ManifestDetector, MemoryStore, tables};
use weave_sync::{
    Doctor, HashListCache, Health, ImportHandler, ImportPool, SyncActor, SyncConfig, SyncError,
    SyncOrchestrator, SyncPhase, SyncStateHandle,
};
use weave_workers::{LocalSpawner, WorkerError, WorkerPool};

struct Harness {
    upstream: TestUpstream,
    memory: MemoryStore,
    store: GatewayStore,
    state: SyncStateHandle,
    cancellation: CancellationToken,
    dir: TempDir,
}

impl Harness {
    async fn new(upstream: TestUpstream) -> Self {
        let memory = MemoryStore::new();
        let store =
            GatewayStore::new(Arc::new(memory.clone())).with_processor(Arc::new(ManifestDetector));
        store.init().await.unwrap();
        Self {
            upstream,
            memory,
            store,
            state: SyncStateHandle::new("test"),
            cancellation: CancellationToken::new(),
            dir: TempDir::new().unwrap(),
        }
    }

    fn pool(&self, size: usize) -> ImportPool {
        let handler = ImportHandler::new(self.upstream.clone());
        WorkerPool::spawn(&LocalSpawner::new(handler), size).unwrap()
    }

    fn orchestrator(&self, config: SyncConfig) -> SyncOrchestrator {
        let cache = HashListCache::new(self.dir.path(), &config.keyspace).with_cap(config.sync_length);
        SyncOrchestrator::new(
            config,
            self.store.clone(),
            Arc::new(self.upstream.clone()),
            self.pool(2),
            cache,
            self.state.clone(),
            self.cancellation.clone(),
        )
    }

    async fn caught_up(&self) -> SyncOrchestrator {
        let mut orchestrator = self.orchestrator(SyncConfig::default());
        let first_run = orchestrator.bootstrap().await.unwrap();
        assert!(orchestrator.catch_up(first_run).await.unwrap());
        orchestrator
    }

    async fn missing(&self) -> Vec<u64> {
        let doctor = Doctor::new(self.store.clone(), Arc::new(self.upstream.clone()));
        doctor.find_missing_blocks(self.upstream.hash_list().len() as u64).await.unwrap()
    }

    async fn wait_for_phase(&self, phase: SyncPhase) {
        for _ in 0..500 {
            if self.state.phase() == phase {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never reached {phase}, stuck in {}", self.state.phase());
    }
}

#[tokio::test]
async fn test_first_run_imports_the_whole_hash_list() {
    let harness = Harness::new(TestUpstream::with_chain(3, 2)).await;
    assert_eq!(harness.missing().await, vec![0, 1, 2]);

    let orchestrator = harness.caught_up().await;
    assert!(harness.missing().await.is_empty());
    assert_eq!(orchestrator.hashes(), ["main-0", "main-1", "main-2"]);
    assert_eq!(harness.state.top(), Some((2, "main-2".to_string())));
    assert!(harness.state.snapshot().in_flight.is_empty());

    let status = harness.state.status();
    assert_eq!(status.status, Health::Ok);
    assert_eq!((status.gateway_height, status.arweave_height, status.delta), (2, 2, 0));

    let tx = harness.store.get_transaction("main-2-1").await.unwrap().unwrap();
    assert_eq!(tx.tx_index, 2_001);
    assert_eq!(harness.memory.row_count(tables::BLOCK_HEIGHT_TO_HASH), 3);
}

#[tokio::test]
async fn test_sync_moves_to_polling_and_stops_on_cancellation() {
    let harness = Harness::new(TestUpstream::with_chain(3, 1)).await;
    let config = SyncConfig { poll_interval: Duration::from_millis(10), ..Default::default() };
    let orchestrator = harness.orchestrator(config);
    let task = tokio::spawn(orchestrator.start(()));

    harness.wait_for_phase(SyncPhase::Polling).await;
    harness.upstream.extend("main", 1, 1);
    for _ in 0..500 {
        if harness.state.top().is_some_and(|(height, _)| height == 3) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(harness.state.top(), Some((3, "main-3".to_string())));

    harness.cancellation.cancel();
    task.await.unwrap().unwrap();
    assert_eq!(harness.state.phase(), SyncPhase::Stopped);
    let status = harness.store.load_status("gateway").await.unwrap().unwrap();
    assert_eq!(status.phase, "stopped");
    assert_eq!(status.gateway_height, 3);
}

#[tokio::test]
async fn test_poll_extends_the_chain() {
    let harness = Harness::new(TestUpstream::with_chain(3, 1)).await;
    let mut orchestrator = harness.caught_up().await;

    orchestrator.poll_once().await.unwrap();
    assert_eq!(harness.state.top(), Some((2, "main-2".to_string())));

    harness.upstream.extend("main", 1, 1);
    orchestrator.poll_once().await.unwrap();
    assert_eq!(harness.state.top(), Some((3, "main-3".to_string())));
    assert!(harness.store.get_transaction("main-3-0").await.unwrap().is_some());
    assert_eq!(orchestrator.hashes().len(), 4);
}

#[tokio::test]
async fn test_poll_catches_up_several_blocks() {
    let harness = Harness::new(TestUpstream::with_chain(3, 1)).await;
    let mut orchestrator = harness.caught_up().await;

    harness.upstream.extend("main", 3, 1);
    orchestrator.poll_once().await.unwrap();
    assert_eq!(harness.state.top(), Some((5, "main-5".to_string())));
    assert!(harness.missing().await.is_empty());
}

#[tokio::test]
async fn test_poll_escalates_a_fatal_worker_fetch() {
    let harness = Harness::new(TestUpstream::with_chain(3, 1)).await;
    let mut orchestrator = harness.caught_up().await;

    harness.upstream.withhold_block(3);
    harness.upstream.extend("main", 1, 1);
    let err = orchestrator.poll_once().await.unwrap_err();
    assert!(matches!(err, SyncError::Worker(WorkerError::Task { fatal: true, .. })), "{err:?}");
    assert!(err.is_fatal());
    assert_eq!(harness.state.top(), Some((2, "main-2".to_string())));
    assert!(harness.state.snapshot().in_flight.is_empty());
}

#[tokio::test]
async fn test_sync_stops_when_a_worker_fetch_is_fatal() {
    let harness = Harness::new(TestUpstream::with_chain(3, 1)).await;
    let config = SyncConfig { poll_interval: Duration::from_millis(10), ..Default::default() };
    let task = tokio::spawn(harness.orchestrator(config).start(()));

    harness.wait_for_phase(SyncPhase::Polling).await;
    harness.upstream.withhold_block(3);
    harness.upstream.extend("main", 1, 1);

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("sync kept polling past a fatal fetch")
        .unwrap();
    assert!(result.unwrap_err().is_fatal());
    assert_eq!(harness.state.phase(), SyncPhase::Stopped);
    assert_eq!(harness.store.max_height().await.unwrap(), Some(2));
}

#[tokio::test]
async fn test_poll_recovers_from_a_fork() {
    let harness = Harness::new(TestUpstream::with_chain(11, 1)).await;
    let mut orchestrator = harness.caught_up().await;
    assert_eq!(harness.state.top(), Some((10, "main-10".to_string())));

    harness.upstream.reorg(9, 11, "fork");
    orchestrator.poll_once().await.unwrap();

    assert_eq!(harness.state.phase(), SyncPhase::Polling);
    assert_eq!(harness.state.top(), Some((11, "fork-11".to_string())));
    assert_eq!(harness.store.block_hash_at(9).await.unwrap().as_deref(), Some("main-9"));
    assert_eq!(harness.store.block_hash_at(10).await.unwrap().as_deref(), Some("fork-10"));
    assert_eq!(harness.store.block_hash_at(11).await.unwrap().as_deref(), Some("fork-11"));
    assert!(harness.store.get_block("main-10").await.unwrap().is_none());
    assert!(harness.store.get_transaction("main-10-0").await.unwrap().is_none());
    assert!(harness.store.get_transaction("fork-10-0").await.unwrap().is_some());
    assert!(harness.store.get_transaction("main-9-0").await.unwrap().is_some());
    assert_eq!(&orchestrator.hashes()[9..], ["main-9", "fork-10", "fork-11"]);
    assert!(harness.missing().await.is_empty());
}

#[tokio::test]
async fn test_resync_leaves_the_store_unchanged() {
    let harness = Harness::new(TestUpstream::with_chain(4, 3)).await;
    let orchestrator = harness.caught_up().await;
    let mut once = harness.memory.dump();
    once.remove(tables::GATEWAY_STATUS);

    orchestrator.import_heights((0..4).collect()).await.unwrap();
    let mut twice = harness.memory.dump();
    twice.remove(tables::GATEWAY_STATUS);
    assert_eq!(twice, once);
}

#[tokio::test]
async fn test_resume_fills_gaps() {
    let harness = Harness::new(TestUpstream::with_chain(6, 1)).await;
    harness.caught_up().await;
    harness.store.rollback_block(2).await.unwrap();
    harness.store.rollback_block(4).await.unwrap();
    assert_eq!(harness.missing().await, vec![2, 4]);

    let mut orchestrator = harness.orchestrator(SyncConfig::default());
    assert!(!orchestrator.bootstrap().await.unwrap());
    assert_eq!(harness.state.top(), Some((5, "main-5".to_string())));
    assert!(orchestrator.catch_up(false).await.unwrap());
    assert!(harness.missing().await.is_empty());
}

#[tokio::test]
async fn test_stale_hash_list_is_refreshed_after_a_dequeue() {
    let harness = Harness::new(TestUpstream::with_chain(3, 1)).await;
    let mut orchestrator = harness.orchestrator(SyncConfig::default());
    assert!(orchestrator.bootstrap().await.unwrap());

    harness.upstream.reorg(1, 2, "fork");
    assert!(orchestrator.catch_up(true).await.unwrap());
    assert_eq!(harness.store.block_hash_at(2).await.unwrap().as_deref(), Some("fork-2"));
    assert_eq!(orchestrator.hashes(), ["main-0", "main-1", "fork-2"]);
}

#[tokio::test]
async fn test_withheld_transaction_exhausts_requeues() {
    let harness = Harness::new(TestUpstream::with_chain(3, 1)).await;
    harness.upstream.withhold_transaction("main-1-0");
    let mut orchestrator = harness.orchestrator(SyncConfig { max_requeues: 2, ..Default::default() });
    assert!(orchestrator.bootstrap().await.unwrap());

    let err = orchestrator.catch_up(true).await.unwrap_err();
    assert!(matches!(err, SyncError::RequeueExhausted { height: 1, attempts: 3 }));
    assert!(err.is_fatal());
    assert_eq!(harness.store.block_hash_at(1).await.unwrap(), None);
}

#[tokio::test]
async fn test_released_transaction_lands_on_requeue() {
    let harness = Harness::new(TestUpstream::with_chain(3, 1)).await;
    harness.upstream.withhold_transaction("main-1-0");
    let mut orchestrator = harness.orchestrator(SyncConfig::default());
    assert!(orchestrator.bootstrap().await.unwrap());

    let report = orchestrator.import_heights(vec![0, 2]).await.unwrap();
    assert_eq!(report.imported, 2);
    harness.upstream.release_transaction("main-1-0");
    let report = orchestrator.import_heights(vec![1]).await.unwrap();
    assert_eq!(report.imported, 1);
    assert!(harness.missing().await.is_empty());
}

#[tokio::test]
async fn test_development_sync_length_stops_without_polling() {
    let harness = Harness::new(TestUpstream::with_chain(5, 1)).await;
    let config = SyncConfig { sync_length: Some(3), ..Default::default() };
    harness.orchestrator(config).start(()).await.unwrap();

    assert_eq!(harness.state.phase(), SyncPhase::Stopped);
    assert_eq!(harness.store.max_height().await.unwrap(), Some(2));
    assert_eq!(harness.store.block_hash_at(3).await.unwrap(), None);
}

#[tokio::test]
async fn test_cancelled_catch_up_dispatches_nothing() {
    let harness = Harness::new(TestUpstream::with_chain(3, 1)).await;
    let mut orchestrator = harness.orchestrator(SyncConfig::default());
    assert!(orchestrator.bootstrap().await.unwrap());

    harness.cancellation.cancel();
    assert!(!orchestrator.catch_up(true).await.unwrap());
    assert!(harness.store.is_empty().await.unwrap());
}
