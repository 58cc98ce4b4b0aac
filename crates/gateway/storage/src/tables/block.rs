//! Block level records.

use super::{
    BLOCK, BLOCK_HEIGHT_SORTED_ASC, BLOCK_HEIGHT_SORTED_DESC, BLOCK_HEIGHT_TO_HASH, BLOCK_POA,
    Record,
};
use crate::{KeyPart, Order, Row, StoreError, TableSchema};
use weave_protocol::{Block, Bucketing, ProofOfAccess, Tag};

/// The primary block record.
///
/// The proof of access lives in [`BlockPoaRecord`]; a block read back from this table has no
/// `poa`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord(pub Block);

impl Record for BlockRecord {
    fn schema() -> TableSchema {
        TableSchema::new(BLOCK, &["indep_hash"], &[])
    }

    fn to_row(&self) -> Row {
        let block = &self.0;
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Row::new()
            .with("indep_hash", block.indep_hash.as_str())
            .with("height", block.height)
            .with("timestamp", block.timestamp)
            .with_opt("previous_block", non_empty(&block.previous_block))
            .with_opt("txs", (!block.txs.is_empty()).then(|| block.txs.clone()))
            .with("tx_count", block.txs.len() as u64)
            .with_opt("nonce", block.nonce.clone())
            .with_opt("hash", block.hash.clone())
            .with_opt("last_retarget", block.last_retarget)
            .with_opt("diff", block.diff)
            .with_opt("cumulative_diff", block.cumulative_diff)
            .with_opt("reward_addr", block.reward_addr.clone())
            .with_opt("reward_pool", block.reward_pool)
            .with_opt("weave_size", block.weave_size)
            .with_opt("block_size", block.block_size)
            .with_opt("tx_root", block.tx_root.clone())
            .with_opt("wallet_list", block.wallet_list.clone())
            .with_opt("hash_list_merkle", block.hash_list_merkle.clone())
            .with_opt("tags", (!block.tags.is_empty()).then(|| tags_to_pairs(&block.tags)))
    }

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        let text = |column| row.opt_text(column).map(|v| v.map(str::to_string));
        Ok(Self(Block {
            indep_hash: row.text("indep_hash")?.to_string(),
            height: row.long("height")?,
            previous_block: text("previous_block")?.unwrap_or_default(),
            timestamp: row.opt_long("timestamp")?.unwrap_or_default(),
            txs: row.list("txs")?,
            nonce: text("nonce")?,
            hash: text("hash")?,
            last_retarget: row.opt_long("last_retarget")?,
            diff: row.opt_varint("diff")?,
            cumulative_diff: row.opt_varint("cumulative_diff")?,
            reward_addr: text("reward_addr")?,
            reward_pool: row.opt_varint("reward_pool")?,
            weave_size: row.opt_varint("weave_size")?,
            block_size: row.opt_varint("block_size")?,
            tx_root: text("tx_root")?,
            wallet_list: text("wallet_list")?,
            hash_list_merkle: text("hash_list_merkle")?,
            tags: pairs_to_tags(row.pairs("tags")?),
            poa: None,
        }))
    }
}

/// The proof of access of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPoaRecord {
    /// The block hash.
    pub block_hash: String,
    /// The block height.
    pub block_height: u64,
    /// The proof.
    pub poa: ProofOfAccess,
}

impl BlockPoaRecord {
    /// The record for `block`, if it carries a proof.
    pub fn for_block(block: &Block) -> Option<Self> {
        let poa = block.poa.as_ref()?;
        Some(Self {
            block_hash: block.indep_hash.clone(),
            block_height: block.height,
            poa: poa.clone(),
        })
    }
}

impl Record for BlockPoaRecord {
    fn schema() -> TableSchema {
        TableSchema::new(BLOCK_POA, &["block_hash"], &[])
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("block_hash", self.block_hash.as_str())
            .with("block_height", self.block_height)
            .with("option", self.poa.option.as_str())
            .with("tx_path", self.poa.tx_path.as_str())
            .with("data_path", self.poa.data_path.as_str())
            .with("chunk", self.poa.chunk.as_str())
    }

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        let text = |column| row.opt_text(column).map(|v| v.unwrap_or_default().to_string());
        Ok(Self {
            block_hash: row.text("block_hash")?.to_string(),
            block_height: row.long("block_height")?,
            poa: ProofOfAccess {
                option: text("option")?,
                tx_path: text("tx_path")?,
                data_path: text("data_path")?,
                chunk: text("chunk")?,
            },
        })
    }
}

/// The height index entry of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightToHashRecord {
    /// The block height.
    pub height: u64,
    /// The block hash.
    pub hash: String,
}

impl HeightToHashRecord {
    /// The partition holding `height`.
    pub fn partition(height: u64) -> Vec<KeyPart> {
        bucket_key(Bucketing::for_height(height))
    }
}

impl Record for HeightToHashRecord {
    fn schema() -> TableSchema {
        TableSchema::new(BLOCK_HEIGHT_TO_HASH, &["partition_id", "bucket_id"], &["block_height"])
    }

    fn to_row(&self) -> Row {
        bucketed(Bucketing::for_height(self.height))
            .with("block_height", self.height)
            .with("block_hash", self.hash.as_str())
    }

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self { height: row.long("block_height")?, hash: row.text("block_hash")?.to_string() })
    }
}

/// A block in the height sorted projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightSortedRecord {
    /// The block height.
    pub height: u64,
    /// The block hash.
    pub hash: String,
    /// The block timestamp.
    pub timestamp: u64,
    /// The parent hash.
    pub previous_block: String,
}

impl HeightSortedRecord {
    /// The projection table for `order`.
    pub const fn table(order: Order) -> &'static str {
        match order {
            Order::Asc => BLOCK_HEIGHT_SORTED_ASC,
            Order::Desc => BLOCK_HEIGHT_SORTED_DESC,
        }
    }

    /// The layout of the projection for `order`.
    pub fn schema_for(order: Order) -> TableSchema {
        TableSchema::new(Self::table(order), &["partition_id", "bucket_id"], &["block_height"])
            .ordered(order)
    }

    /// The record for `block`.
    pub fn for_block(block: &Block) -> Self {
        Self {
            height: block.height,
            hash: block.indep_hash.clone(),
            timestamp: block.timestamp,
            previous_block: block.previous_block.clone(),
        }
    }

    /// Maps the record to a row.
    pub fn to_row(&self) -> Row {
        bucketed(Bucketing::for_height(self.height))
            .with("block_height", self.height)
            .with("block_hash", self.hash.as_str())
            .with("timestamp", self.timestamp)
            .with("previous_block", self.previous_block.as_str())
    }
}

pub(super) fn bucketed(bucketing: Bucketing) -> Row {
    Row::new().with("partition_id", bucketing.partition_id).with("bucket_id", bucketing.bucket_id)
}

pub(super) fn bucket_key(bucketing: Bucketing) -> Vec<KeyPart> {
    vec![KeyPart::Long(bucketing.partition_id), KeyPart::Long(bucketing.bucket_id)]
}

pub(super) fn tags_to_pairs(tags: &[Tag]) -> Vec<(String, String)> {
    tags.iter().map(|tag| (tag.name.clone(), tag.value.clone())).collect()
}

pub(super) fn pairs_to_tags(pairs: Vec<(String, String)>) -> Vec<Tag> {
    pairs.into_iter().map(|(name, value)| Tag { name, value }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_protocol::U256;

    #[test]
    fn test_block_row_is_sparse() {
        let block = Block {
            indep_hash: "h".into(),
            height: 0,
            timestamp: 1,
            ..Default::default()
        };
        let row = BlockRecord(block.clone()).to_row();
        assert_eq!(
            row.columns().collect::<Vec<_>>(),
            vec!["height", "indep_hash", "timestamp", "tx_count"]
        );
        assert_eq!(BlockRecord::from_row(&row).unwrap().0, block);
    }

    #[test]
    fn test_block_row_roundtrip_keeps_big_amounts() {
        let block = Block {
            indep_hash: "h".into(),
            height: 7,
            previous_block: "p".into(),
            txs: vec!["a".into(), "b".into()],
            reward_pool: Some(U256::MAX),
            weave_size: Some(U256::from(12u64)),
            tags: vec![Tag::from_utf8("k", "v")],
            ..Default::default()
        };
        let row = BlockRecord(block.clone()).to_row();
        assert_eq!(row.long("tx_count").unwrap(), 2);
        assert_eq!(BlockRecord::from_row(&row).unwrap().0, block);
    }

    #[test]
    fn test_height_rows_are_bucketed() {
        let row = HeightToHashRecord { height: 123_456, hash: "h".into() }.to_row();
        let key = HeightToHashRecord::schema().primary_key(&row).unwrap();
        assert_eq!(key, vec![KeyPart::Long(1), KeyPart::Long(123), KeyPart::Long(123_456)]);
        assert_eq!(HeightToHashRecord::partition(123_456), key[..2].to_vec());
    }
}
