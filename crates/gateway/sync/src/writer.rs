//! Applies fetched blocks to the store.

use crate::{BlockImport, ImportCode};
use futures::future::try_join_all;
use weave_protocol::{Block, tx_index};
use weave_storage::{GatewayStore, StoreError};

/// Writes [`BlockImport`]s.
///
/// Every transaction of the block is written before the block itself, whose height index entry
/// goes last. A write that fails part way leaves the height missing from the index, so the next
/// doctor pass finds it again.
#[derive(Debug, Clone)]
pub struct BlockWriter {
    store: GatewayStore,
}

impl BlockWriter {
    /// Creates a writer over `store`.
    pub const fn new(store: GatewayStore) -> Self {
        Self { store }
    }

    /// Writes an [`ImportCode::Ok`] import and returns the written block. Other codes carry
    /// nothing to write and return `None`.
    pub async fn apply(&self, import: BlockImport) -> Result<Option<Block>, StoreError> {
        let BlockImport { height, code: ImportCode::Ok, block: Some(block), transactions } = import
        else {
            return Ok(None);
        };

        let writes = transactions.iter().zip(0u64..).map(|(fetched, position)| {
            let block = &block;
            async move {
                let index = tx_index(height, position)?;
                self.store
                    .import_transaction(height, index, &fetched.tx, block, fetched.offset.as_ref())
                    .await
            }
        });
        try_join_all(writes).await?;
        self.store.import_block(&block).await?;
        trace!(target: "sync", height, txs = transactions.len(), "Wrote block");
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FetchedTransaction;
    use std::sync::Arc;
    use weave_protocol::Transaction;
    use weave_storage::MemoryStore;

    async fn writer() -> BlockWriter {
        let store = GatewayStore::new(Arc::new(MemoryStore::new()));
        store.init().await.unwrap();
        BlockWriter::new(store)
    }

    fn import(height: u64, txs: usize) -> BlockImport {
        let transactions: Vec<_> = (0..txs)
            .map(|position| FetchedTransaction {
                tx: Transaction { id: format!("t-{height}-{position}"), ..Default::default() },
                offset: None,
            })
            .collect();
        let block = Block {
            indep_hash: format!("b-{height}"),
            height,
            txs: transactions.iter().map(|t| t.tx.id.clone()).collect(),
            ..Default::default()
        };
        BlockImport { height, code: ImportCode::Ok, block: Some(block), transactions }
    }

    #[tokio::test]
    async fn test_apply_assigns_tx_indexes() {
        let writer = writer().await;
        let block = writer.apply(import(7, 3)).await.unwrap().unwrap();
        assert_eq!(block.indep_hash, "b-7");
        assert_eq!(writer.store.block_hash_at(7).await.unwrap().as_deref(), Some("b-7"));
        let stored = writer.store.get_transaction("t-7-2").await.unwrap().unwrap();
        assert_eq!(stored.tx_index, 7_002);
        assert_eq!(stored.block_hash, "b-7");
    }

    #[tokio::test]
    async fn test_apply_skips_unfetched_heights() {
        let writer = writer().await;
        let requeue = BlockImport::empty(3, ImportCode::Requeue);
        assert_eq!(writer.apply(requeue).await.unwrap(), None);
        assert!(writer.store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_too_many_transactions_leave_a_gap() {
        let writer = writer().await;
        let err = writer.apply(import(1, 1_001)).await.unwrap_err();
        assert!(matches!(err, StoreError::Index(_)));
        assert_eq!(writer.store.block_hash_at(1).await.unwrap(), None);
    }
}
