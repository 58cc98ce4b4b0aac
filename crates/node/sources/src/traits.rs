//! The [`UpstreamClient`] trait.

use crate::FetchError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use weave_protocol::{Block, Chunk, NodeInfo, Transaction, TxOffset};

/// Fetches chain data from upstream peers.
///
/// Fetchers the sync cannot proceed without (`info`, `hash_list`, blocks) surface exhaustion as
/// [`FetchError::Exhausted`]. Per-transaction fetchers return `Ok(None)` instead, leaving the
/// caller to decide whether to requeue.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Fetches `GET /info`.
    async fn fetch_info(&self) -> Result<NodeInfo, FetchError>;

    /// Fetches `GET /hash_list`, returned so that the index of a hash is its height.
    async fn fetch_hash_list(&self) -> Result<Vec<String>, FetchError>;

    /// Fetches `GET /block/hash/:hash`.
    async fn fetch_block_by_hash(&self, hash: &str) -> Result<Block, FetchError>;

    /// Fetches `GET /block/height/:height`.
    ///
    /// A response whose embedded height differs from `height` is
    /// [`FetchError::HeightMismatch`] and is not retried.
    async fn fetch_block_by_height(&self, height: u64) -> Result<Block, FetchError>;

    /// Fetches `GET /tx/:id`.
    async fn fetch_transaction(&self, id: &str) -> Result<Option<Transaction>, FetchError>;

    /// Fetches `GET /tx/:id/offset`.
    async fn fetch_tx_offset(&self, id: &str) -> Result<Option<TxOffset>, FetchError>;

    /// Fetches `GET /chunk/:offset`.
    async fn fetch_chunk(&self, offset: u64) -> Result<Option<Chunk>, FetchError>;

    /// Assembles the bytes of `id` between the absolute offsets `start` and `end` (inclusive)
    /// by fetching consecutive chunks.
    ///
    /// Any unavailable chunk aborts the whole assembly; partial data is never returned.
    async fn fetch_data_from_chunks(
        &self,
        id: &str,
        start: u64,
        end: u64,
    ) -> Result<Bytes, FetchError> {
        let len = end.saturating_sub(start).saturating_add(1);
        let mut data = BytesMut::with_capacity(usize::try_from(len).unwrap_or_default());
        let mut cursor = start;
        while cursor <= end {
            let unavailable = || FetchError::ChunkUnavailable { id: id.to_string(), offset: cursor };
            let chunk = self.fetch_chunk(cursor).await?.ok_or_else(unavailable)?;
            let bytes = chunk.decode()?;
            if bytes.is_empty() {
                return Err(unavailable());
            }
            data.extend_from_slice(&bytes);
            cursor += bytes.len() as u64;
        }
        data.truncate(usize::try_from(len).unwrap_or(usize::MAX));
        trace!(target: "sources", id, start, end, "Assembled data from chunks");
        Ok(data.freeze())
    }
}
