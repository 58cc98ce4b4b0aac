//! Global ordering keys and partition arithmetic.
//!
//! Every denormalized table is partitioned by a coarse `partition_id` and a finer `bucket_id`,
//! both derived by integer division of a height or a transaction index, so that no single
//! wide-column partition grows without bound.

use crate::IndexError;
use derive_more::Display;

/// The maximum number of transactions in a block.
pub const MAX_TX_PER_BLOCK: u64 = 1_000;

/// Heights per partition.
pub const HEIGHT_PARTITION_SIZE: u64 = 100_000;

/// Heights per bucket.
pub const HEIGHT_BUCKET_SIZE: u64 = 1_000;

/// Transaction indexes per partition.
pub const TX_INDEX_PARTITION_SIZE: u64 = HEIGHT_PARTITION_SIZE * MAX_TX_PER_BLOCK;

/// Transaction indexes per bucket.
pub const TX_INDEX_BUCKET_SIZE: u64 = HEIGHT_BUCKET_SIZE * MAX_TX_PER_BLOCK;

/// Computes the global ordering key of the transaction at `position` in the block at `height`.
pub const fn tx_index(height: u64, position: u64) -> Result<u64, IndexError> {
    if position >= MAX_TX_PER_BLOCK {
        return Err(IndexError::PositionOutOfRange { position, max: MAX_TX_PER_BLOCK });
    }
    match height.checked_mul(MAX_TX_PER_BLOCK) {
        Some(base) => Ok(base + position),
        None => Err(IndexError::Overflow(height)),
    }
}

/// The partition and bucket a height or transaction index falls into.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{partition_id}/{bucket_id}")]
pub struct Bucketing {
    /// The coarse partition.
    pub partition_id: u64,
    /// The bucket inside the partition.
    pub bucket_id: u64,
}

impl Bucketing {
    /// Bucketing for a block height.
    pub const fn for_height(height: u64) -> Self {
        Self {
            partition_id: height / HEIGHT_PARTITION_SIZE,
            bucket_id: height / HEIGHT_BUCKET_SIZE,
        }
    }

    /// Bucketing for a transaction index.
    pub const fn for_tx_index(tx_index: u64) -> Self {
        Self {
            partition_id: tx_index / TX_INDEX_PARTITION_SIZE,
            bucket_id: tx_index / TX_INDEX_BUCKET_SIZE,
        }
    }

    /// All height buckets intersecting the inclusive range `[from, to]`, ascending.
    pub fn height_buckets(from: u64, to: u64) -> impl Iterator<Item = Self> {
        (from / HEIGHT_BUCKET_SIZE..=to / HEIGHT_BUCKET_SIZE)
            .map(|bucket| Self::for_height(bucket * HEIGHT_BUCKET_SIZE))
    }
}
