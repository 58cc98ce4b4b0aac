//! The tasks the orchestrator runs on its worker pools.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use weave_protocol::{Block, PathManifest, Transaction, TxOffset};
use weave_workers::WorkerPool;

/// The pool block and manifest imports run on.
pub type ImportPool = WorkerPool<ImportRequest, ImportResponse>;

/// A task for an import worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum ImportRequest {
    /// Warm the worker up.
    Prime,
    /// Fetch the block at `height` and everything it carries.
    ImportBlock {
        /// The height to fetch.
        height: u64,
        /// The hash the hash list has at `height`.
        expected_hash: String,
    },
    /// Resolve the bodies of queued manifests.
    ImportManifests {
        /// The manifest transactions.
        tx_ids: Vec<String>,
    },
}

/// The answer to an [`ImportRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum ImportResponse {
    /// The worker is warm.
    Primed,
    /// The fetched block.
    Block(BlockImport),
    /// One outcome per requested manifest, in request order.
    Manifests {
        /// The outcomes.
        outcomes: Vec<ManifestOutcome>,
    },
}

/// What the orchestrator should do with a height after a fetch.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportCode {
    /// Everything was fetched; write it.
    #[display("ok")]
    Ok,
    /// Something could not be fetched this time; try the height again later.
    #[display("requeue")]
    Requeue,
    /// Upstream has another block at the height; the hash list is stale.
    #[display("dequeue")]
    Dequeue,
}

/// A transaction of a fetched block, with its data offset if it carries data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedTransaction {
    /// The transaction.
    pub tx: Transaction,
    /// The offset of its data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<TxOffset>,
}

/// The result of an [`ImportRequest::ImportBlock`].
///
/// `block` and `transactions` are only set with [`ImportCode::Ok`]; `transactions` follows the
/// block's transaction order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockImport {
    /// The requested height.
    pub height: u64,
    /// The outcome.
    pub code: ImportCode,
    /// The fetched block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
    /// The fetched transactions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transactions: Vec<FetchedTransaction>,
}

impl BlockImport {
    /// An outcome without payload.
    pub const fn empty(height: u64, code: ImportCode) -> Self {
        Self { height, code, block: None, transactions: Vec::new() }
    }
}

/// The outcome of resolving one manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestOutcome {
    /// The manifest transaction.
    pub tx_id: String,
    /// What happened.
    pub result: ManifestResult,
}

/// How resolving a manifest went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum ManifestResult {
    /// The body was fetched and parsed.
    Parsed(PathManifest),
    /// The body was fetched but is not a path manifest.
    Malformed(String),
    /// The body could not be fetched.
    Unavailable(String),
}
