//! Queues manifest transactions for resolution.

use crate::{
    Statement, TxPostProcessor,
    tables::{MANIFEST_QUEUE, ManifestQueueRecord, Record},
};
use weave_protocol::Transaction;

/// Queues every transaction tagged as a path manifest.
///
/// The queue entry is inserted only if absent, so re-importing a block never resets the attempt
/// counter of an entry already in flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestDetector;

impl TxPostProcessor for ManifestDetector {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn process(&self, tx: &Transaction, height: u64) -> Vec<Statement> {
        if !tx.is_manifest() {
            return Vec::new();
        }
        debug!(target: "manifest", tx = %tx.id, height, "Queueing manifest");
        let entry = ManifestQueueRecord::pending(tx.id.as_str(), height);
        vec![Statement::insert_if_not_exists(MANIFEST_QUEUE, entry.to_row())]
    }
}
