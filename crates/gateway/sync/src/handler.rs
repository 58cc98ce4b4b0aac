//! The worker side of the import tasks.

use crate::{
    BlockImport, FetchedTransaction, ImportCode, ImportRequest, ImportResponse, ManifestOutcome,
    ManifestResult, Metrics,
};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use weave_protocol::PathManifest;
use weave_sources::{FetchError, UpstreamClient};
use weave_workers::{TaskFailure, TaskHandler, WorkerContext};

/// Runs [`ImportRequest`]s against upstream.
///
/// Workers only fetch. Everything they return is written by the parent, which owns the store.
#[derive(Debug)]
pub struct ImportHandler<U> {
    upstream: Arc<U>,
}

impl<U> Clone for ImportHandler<U> {
    fn clone(&self) -> Self {
        Self { upstream: Arc::clone(&self.upstream) }
    }
}

impl<U: UpstreamClient> ImportHandler<U> {
    /// Creates a handler fetching from `upstream`.
    pub fn new(upstream: U) -> Self {
        Self { upstream: Arc::new(upstream) }
    }

    /// Creates a handler sharing `upstream`.
    pub const fn shared(upstream: Arc<U>) -> Self {
        Self { upstream }
    }

    /// Fetches the block at `height` and its transactions.
    ///
    /// Fetch failures the sync cannot recover from are errors. A block other than
    /// `expected_hash` dequeues the height and a transaction that could not be fetched requeues
    /// it.
    pub async fn import_block(
        &self,
        ctx: &WorkerContext,
        height: u64,
        expected_hash: &str,
    ) -> Result<BlockImport, FetchError> {
        let block = self.upstream.fetch_block_by_height(height).await?;
        if block.indep_hash != expected_hash {
            warn!(
                target: "sync",
                height,
                expected = expected_hash,
                fetched = %block.indep_hash,
                "Block differs from the hash list, dequeueing"
            );
            return Ok(BlockImport::empty(height, ImportCode::Dequeue));
        }

        let fetched = try_join_all(block.txs.iter().map(|id| self.fetch_transaction(id))).await?;
        let Some(transactions) = fetched.into_iter().collect::<Option<Vec<_>>>() else {
            warn!(target: "sync", height, "Missing transactions, requeueing");
            return Ok(BlockImport::empty(height, ImportCode::Requeue));
        };

        ctx.stat(Metrics::WORKER_TXS_FETCHED, transactions.len() as f64);
        debug!(target: "sync", height, txs = transactions.len(), "Fetched block");
        Ok(BlockImport { height, code: ImportCode::Ok, block: Some(block), transactions })
    }

    /// Fetches a transaction and, if it carries data, its offset. `None` if either is unavailable.
    async fn fetch_transaction(&self, id: &str) -> Result<Option<FetchedTransaction>, FetchError> {
        let Some(tx) = self.upstream.fetch_transaction(id).await? else {
            return Ok(None);
        };
        if !tx.has_data() {
            return Ok(Some(FetchedTransaction { tx, offset: None }));
        }
        let Some(offset) = self.upstream.fetch_tx_offset(id).await? else {
            return Ok(None);
        };
        Ok(Some(FetchedTransaction { tx, offset: Some(offset) }))
    }

    /// Fetches and parses the body of every manifest in `tx_ids`.
    pub async fn import_manifests(&self, tx_ids: Vec<String>) -> Vec<ManifestOutcome> {
        let mut outcomes = Vec::with_capacity(tx_ids.len());
        for tx_id in tx_ids {
            let result = self.resolve_manifest(&tx_id).await;
            if let ManifestResult::Malformed(reason) | ManifestResult::Unavailable(reason) =
                &result
            {
                debug!(target: "manifest", tx = %tx_id, %reason, "Manifest not resolved");
            }
            outcomes.push(ManifestOutcome { tx_id, result });
        }
        outcomes
    }

    async fn resolve_manifest(&self, tx_id: &str) -> ManifestResult {
        let offset = match self.upstream.fetch_tx_offset(tx_id).await {
            Ok(Some(offset)) => offset,
            Ok(None) => return ManifestResult::Unavailable("offset unavailable".into()),
            Err(err) => return ManifestResult::Unavailable(err.to_string()),
        };
        let (start, end) = match offset.range() {
            Ok(range) => range,
            Err(err) => return ManifestResult::Malformed(err.to_string()),
        };
        let body = match self.upstream.fetch_data_from_chunks(tx_id, start, end).await {
            Ok(body) => body,
            Err(err) => return ManifestResult::Unavailable(err.to_string()),
        };
        match PathManifest::parse(&body) {
            Ok(manifest) => ManifestResult::Parsed(manifest),
            Err(err) => ManifestResult::Malformed(err.to_string()),
        }
    }
}

#[async_trait]
impl<U: UpstreamClient + 'static> TaskHandler for ImportHandler<U> {
    type Request = ImportRequest;
    type Response = ImportResponse;

    async fn handle(
        &self,
        ctx: &WorkerContext,
        request: ImportRequest,
    ) -> Result<ImportResponse, TaskFailure> {
        match request {
            ImportRequest::Prime => {
                let info = self.upstream.fetch_info().await.map_err(failure)?;
                debug!(target: "sync", worker = ctx.id(), height = info.height, "Primed");
                Ok(ImportResponse::Primed)
            }
            ImportRequest::ImportBlock { height, expected_hash } => self
                .import_block(ctx, height, &expected_hash)
                .await
                .map(ImportResponse::Block)
                .map_err(failure),
            ImportRequest::ImportManifests { tx_ids } => {
                Ok(ImportResponse::Manifests { outcomes: self.import_manifests(tx_ids).await })
            }
        }
    }
}

/// Reports a fetch error to the parent, keeping whether the sync can proceed past it.
fn failure(err: FetchError) -> TaskFailure {
    TaskFailure { reason: err.to_string(), fatal: err.is_fatal() }
}
