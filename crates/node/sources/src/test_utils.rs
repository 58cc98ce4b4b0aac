//! An in-memory upstream for tests.

use crate::{FetchError, UpstreamClient};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};
use weave_protocol::{Block, Chunk, NodeInfo, Transaction, TxOffset, U256};

#[derive(Debug, Default)]
struct TestChain {
    canonical: Vec<Block>,
    blocks: HashMap<String, Block>,
    transactions: HashMap<String, Transaction>,
    offsets: HashMap<String, TxOffset>,
    chunks: BTreeMap<u64, Vec<u8>>,
    weave_size: u64,
    withheld: HashSet<String>,
    withheld_heights: HashSet<u64>,
    block_fetches: u64,
}

/// An upstream chain held in memory.
///
/// Block hashes are `"{label}-{height}"` and transaction ids `"{label}-{height}-{position}"`, so
/// tests can tell branches apart after a [`Self::reorg`]. Blocks from abandoned branches stay
/// fetchable by hash, like they would on a real peer.
#[derive(Debug, Clone, Default)]
pub struct TestUpstream {
    chain: Arc<RwLock<TestChain>>,
}

impl TestUpstream {
    /// Creates an upstream with `len` blocks of `txs_per_block` transactions each.
    pub fn with_chain(len: u64, txs_per_block: usize) -> Self {
        let upstream = Self::default();
        upstream.extend("main", len, txs_per_block);
        upstream
    }

    /// Appends `count` generated blocks on top of the current tip.
    pub fn extend(&self, label: &str, count: u64, txs_per_block: usize) -> Vec<Block> {
        (0..count)
            .map(|_| {
                let height = self.chain.read().canonical.len() as u64;
                let txs = (0..txs_per_block)
                    .map(|position| Transaction {
                        format: 2,
                        id: format!("{label}-{height}-{position}"),
                        owner: format!("owner-{}", position % 3),
                        target: if position % 2 == 0 { String::new() } else { "wallet".into() },
                        ..Default::default()
                    })
                    .collect();
                self.push_block(label, txs)
            })
            .collect()
    }

    /// Appends a block carrying `txs` on top of the current tip.
    pub fn push_block(&self, label: &str, txs: Vec<Transaction>) -> Block {
        let mut chain = self.chain.write();
        let height = chain.canonical.len() as u64;
        let previous_block =
            chain.canonical.last().map(|parent| parent.indep_hash.clone()).unwrap_or_default();
        let block = Block {
            indep_hash: format!("{label}-{height}"),
            height,
            previous_block,
            timestamp: 1_600_000_000 + height * 120,
            txs: txs.iter().map(|tx| tx.id.clone()).collect(),
            ..Default::default()
        };
        for tx in txs {
            chain.transactions.insert(tx.id.clone(), tx);
        }
        chain.blocks.insert(block.indep_hash.clone(), block.clone());
        chain.canonical.push(block.clone());
        block
    }

    /// Abandons every block above `fork_height` and grows a new branch named `label` until the
    /// tip is at `new_tip`.
    pub fn reorg(&self, fork_height: u64, new_tip: u64, label: &str) -> Vec<Block> {
        self.chain.write().canonical.truncate(fork_height as usize + 1);
        self.extend(label, new_tip - fork_height, 1)
    }

    /// Stores `data` as the payload of `id`, split into chunks of `chunk_size` bytes.
    pub fn set_data(&self, id: &str, data: &[u8], chunk_size: usize) -> TxOffset {
        let mut chain = self.chain.write();
        let start = chain.weave_size;
        for (i, piece) in data.chunks(chunk_size.max(1)).enumerate() {
            let chunk_start = start + (i * chunk_size.max(1)) as u64;
            chain.chunks.insert(chunk_start + piece.len() as u64 - 1, piece.to_vec());
        }
        chain.weave_size += data.len() as u64;
        let offset = TxOffset {
            size: U256::from(data.len() as u64),
            offset: U256::from(start + data.len() as u64 - 1),
        };
        chain.offsets.insert(id.to_string(), offset);
        offset
    }

    /// Makes `fetch_transaction` for `id` behave as if every retry failed.
    pub fn withhold_transaction(&self, id: &str) {
        self.chain.write().withheld.insert(id.to_string());
    }

    /// Releases a transaction withheld by [`Self::withhold_transaction`].
    pub fn release_transaction(&self, id: &str) {
        self.chain.write().withheld.remove(id);
    }

    /// Makes `fetch_block_by_height` for `height` fail as exhausted. Fetching the block by hash
    /// still succeeds.
    pub fn withhold_block(&self, height: u64) {
        self.chain.write().withheld_heights.insert(height);
    }

    /// Returns the canonical block at `height`.
    pub fn block_at(&self, height: u64) -> Option<Block> {
        self.chain.read().canonical.get(height as usize).cloned()
    }

    /// Returns the transaction `id`, withheld or not.
    pub fn transaction(&self, id: &str) -> Option<Transaction> {
        self.chain.read().transactions.get(id).cloned()
    }

    /// Returns the canonical tip.
    pub fn tip(&self) -> Option<Block> {
        self.chain.read().canonical.last().cloned()
    }

    /// Returns the canonical hash list, indexed by height.
    pub fn hash_list(&self) -> Vec<String> {
        self.chain.read().canonical.iter().map(|b| b.indep_hash.clone()).collect()
    }

    /// Returns the number of block fetches served so far.
    pub fn block_fetches(&self) -> u64 {
        self.chain.read().block_fetches
    }
}

fn exhausted(what: String) -> FetchError {
    FetchError::Exhausted { what, attempts: 1 }
}

#[async_trait]
impl UpstreamClient for TestUpstream {
    async fn fetch_info(&self) -> Result<NodeInfo, FetchError> {
        let chain = self.chain.read();
        let tip = chain.canonical.last().ok_or_else(|| exhausted("info".into()))?;
        Ok(NodeInfo {
            network: "arweave.test".into(),
            height: tip.height,
            current: tip.indep_hash.clone(),
            blocks: chain.canonical.len() as u64,
            ..Default::default()
        })
    }

    async fn fetch_hash_list(&self) -> Result<Vec<String>, FetchError> {
        Ok(self.hash_list())
    }

    async fn fetch_block_by_hash(&self, hash: &str) -> Result<Block, FetchError> {
        let mut chain = self.chain.write();
        chain.block_fetches += 1;
        chain.blocks.get(hash).cloned().ok_or_else(|| exhausted(format!("block {hash}")))
    }

    async fn fetch_block_by_height(&self, height: u64) -> Result<Block, FetchError> {
        let mut chain = self.chain.write();
        chain.block_fetches += 1;
        if chain.withheld_heights.contains(&height) {
            return Err(exhausted(format!("block {height}")));
        }
        chain
            .canonical
            .get(height as usize)
            .cloned()
            .ok_or_else(|| exhausted(format!("block {height}")))
    }

    async fn fetch_transaction(&self, id: &str) -> Result<Option<Transaction>, FetchError> {
        let chain = self.chain.read();
        if chain.withheld.contains(id) {
            return Ok(None);
        }
        Ok(chain.transactions.get(id).cloned())
    }

    async fn fetch_tx_offset(&self, id: &str) -> Result<Option<TxOffset>, FetchError> {
        Ok(self.chain.read().offsets.get(id).copied())
    }

    async fn fetch_chunk(&self, offset: u64) -> Result<Option<Chunk>, FetchError> {
        let chain = self.chain.read();
        let Some((end, bytes)) = chain.chunks.range(offset..).next() else { return Ok(None) };
        let start = end + 1 - bytes.len() as u64;
        if start > offset {
            return Ok(None);
        }
        Ok(Some(Chunk::from_bytes(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chain_links() {
        let upstream = TestUpstream::with_chain(3, 2);
        let tip = upstream.fetch_block_by_height(2).await.unwrap();
        let parent = upstream.fetch_block_by_hash(&tip.previous_block).await.unwrap();
        assert!(tip.extends(&parent));
        assert_eq!(upstream.fetch_hash_list().await.unwrap(), vec!["main-0", "main-1", "main-2"]);
        assert!(upstream.fetch_transaction("main-1-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reorg_keeps_orphans_fetchable() {
        let upstream = TestUpstream::with_chain(11, 0);
        upstream.reorg(9, 11, "fork");
        let info = upstream.fetch_info().await.unwrap();
        assert_eq!((info.height, info.current.as_str()), (11, "fork-11"));
        let head = upstream.fetch_block_by_hash("fork-11").await.unwrap();
        assert_eq!(head.previous_block, "fork-10");
        let fork_10 = upstream.fetch_block_by_hash("fork-10").await.unwrap();
        assert_eq!(fork_10.previous_block, "main-9");
        assert!(upstream.fetch_block_by_hash("main-10").await.is_ok());
    }

    #[tokio::test]
    async fn test_chunked_data() {
        let upstream = TestUpstream::default();
        let offset = upstream.set_data("tx", b"hello chunked world", 4);
        let (start, end) = offset.range().unwrap();
        let data = upstream.fetch_data_from_chunks("tx", start, end).await.unwrap();
        assert_eq!(&data[..], b"hello chunked world");
    }
}
