//! Transaction level records.

use super::{
    Record, TRANSACTION, TX_ID_SORTED_ASC, TX_ID_SORTED_DESC, TX_OFFSET, TX_TAG,
    block::{bucketed, pairs_to_tags, tags_to_pairs},
};
use crate::{Order, Row, StoreError, TableSchema};
use weave_protocol::{Bucketing, Transaction, TxOffset};

/// The primary transaction record, with its position in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    /// The transaction.
    pub tx: Transaction,
    /// The global ordering key.
    pub tx_index: u64,
    /// The height of the owning block.
    pub block_height: u64,
    /// The hash of the owning block.
    pub block_hash: String,
}

impl Record for TransactionRecord {
    fn schema() -> TableSchema {
        TableSchema::new(TRANSACTION, &["tx_id"], &[])
    }

    fn to_row(&self) -> Row {
        let tx = &self.tx;
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Row::new()
            .with("tx_id", tx.id.as_str())
            .with("tx_index", self.tx_index)
            .with("block_height", self.block_height)
            .with("block_hash", self.block_hash.as_str())
            .with("format", u64::from(tx.format))
            .with_opt("last_tx", non_empty(&tx.last_tx))
            .with_opt("owner", non_empty(&tx.owner))
            .with_opt("tags", (!tx.tags.is_empty()).then(|| tags_to_pairs(&tx.tags)))
            .with("tag_count", tx.tags.len() as u64)
            .with_opt("target", tx.target().map(str::to_string))
            .with("quantity", tx.quantity)
            .with("data_size", tx.data_size)
            .with_opt("data_root", tx.data_root().map(str::to_string))
            .with("reward", tx.reward)
            .with_opt("signature", non_empty(&tx.signature))
            .with_opt("bundled_in", tx.bundled_in().map(str::to_string))
    }

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        let text = |column| row.opt_text(column).map(|v| v.unwrap_or_default().to_string());
        let format = row.opt_long("format")?.unwrap_or(1);
        let tx = Transaction {
            format: u8::try_from(format)
                .map_err(|_| StoreError::Type { column: "format".into(), expected: "u8" })?,
            id: row.text("tx_id")?.to_string(),
            last_tx: text("last_tx")?,
            owner: text("owner")?,
            tags: pairs_to_tags(row.pairs("tags")?),
            target: text("target")?,
            quantity: row.varint("quantity")?,
            data_size: row.varint("data_size")?,
            data_root: text("data_root")?,
            reward: row.varint("reward")?,
            signature: text("signature")?,
            bundled_in: row.opt_text("bundled_in")?.map(str::to_string),
        };
        Ok(Self {
            tx,
            tx_index: row.long("tx_index")?,
            block_height: row.long("block_height")?,
            block_hash: row.text("block_hash")?.to_string(),
        })
    }
}

/// A transaction id in the index sorted projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIdSortedRecord {
    /// The global ordering key.
    pub tx_index: u64,
    /// The transaction id.
    pub tx_id: String,
}

impl TxIdSortedRecord {
    /// The projection table for `order`.
    pub const fn table(order: Order) -> &'static str {
        match order {
            Order::Asc => TX_ID_SORTED_ASC,
            Order::Desc => TX_ID_SORTED_DESC,
        }
    }

    /// The layout of the projection for `order`.
    pub fn schema_for(order: Order) -> TableSchema {
        TableSchema::new(Self::table(order), &["partition_id", "bucket_id"], &["tx_index"])
            .ordered(order)
    }

    /// Maps the record to a row.
    pub fn to_row(&self) -> Row {
        bucketed(Bucketing::for_tx_index(self.tx_index))
            .with("tx_index", self.tx_index)
            .with("tx_id", self.tx_id.as_str())
    }
}

/// One tag of a transaction.
///
/// Tags are stored one row each; `next_tag_index` points at the following tag so the original
/// order can be rebuilt without relying on list ordering in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxTagRecord {
    /// The global ordering key of the transaction.
    pub tx_index: u64,
    /// The position of the tag.
    pub tag_index: u64,
    /// The transaction id.
    pub tx_id: String,
    /// The base64url tag name.
    pub name: String,
    /// The base64url tag value.
    pub value: String,
    /// The position of the next tag, unset on the last one.
    pub next_tag_index: Option<u64>,
}

impl TxTagRecord {
    /// One record per tag of `tx`.
    pub fn for_transaction(tx: &Transaction, tx_index: u64) -> Vec<Self> {
        let count = tx.tags.len() as u64;
        tx.tags
            .iter()
            .zip(0u64..)
            .map(|(tag, tag_index)| Self {
                tx_index,
                tag_index,
                tx_id: tx.id.clone(),
                name: tag.name.clone(),
                value: tag.value.clone(),
                next_tag_index: (tag_index + 1 < count).then_some(tag_index + 1),
            })
            .collect()
    }
}

impl Record for TxTagRecord {
    fn schema() -> TableSchema {
        TableSchema::new(TX_TAG, &["partition_id", "bucket_id"], &["tx_index", "tag_index"])
    }

    fn to_row(&self) -> Row {
        bucketed(Bucketing::for_tx_index(self.tx_index))
            .with("tx_index", self.tx_index)
            .with("tag_index", self.tag_index)
            .with("tx_id", self.tx_id.as_str())
            .with("name", self.name.as_str())
            .with("value", self.value.as_str())
            .with_opt("next_tag_index", self.next_tag_index)
    }

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            tx_index: row.long("tx_index")?,
            tag_index: row.long("tag_index")?,
            tx_id: row.text("tx_id")?.to_string(),
            name: row.text("name")?.to_string(),
            value: row.text("value")?.to_string(),
            next_tag_index: row.opt_long("next_tag_index")?,
        })
    }
}

/// Size and absolute end offset of a transaction's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOffsetRecord {
    /// The transaction id.
    pub tx_id: String,
    /// The offset as returned upstream.
    pub offset: TxOffset,
}

impl Record for TxOffsetRecord {
    fn schema() -> TableSchema {
        TableSchema::new(TX_OFFSET, &["tx_id"], &[])
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("tx_id", self.tx_id.as_str())
            .with("size", self.offset.size)
            .with("offset", self.offset.offset)
    }

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            tx_id: row.text("tx_id")?.to_string(),
            offset: TxOffset { size: row.varint("size")?, offset: row.varint("offset")? },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_protocol::{Tag, U256};

    fn tx() -> Transaction {
        Transaction {
            id: "tx".into(),
            owner: "owner".into(),
            tags: vec![Tag::from_utf8("a", "1"), Tag::from_utf8("b", "2"), Tag::from_utf8("c", "3")],
            quantity: U256::from(10u64).pow(U256::from(30u64)),
            data_size: U256::from(5u64),
            ..Default::default()
        }
    }

    #[test]
    fn test_transaction_roundtrip() {
        let record = TransactionRecord {
            tx: tx(),
            tx_index: 42_001,
            block_height: 42,
            block_hash: "block".into(),
        };
        let row = record.to_row();
        assert!(row.get("target").is_none());
        assert!(row.get("data_root").is_none());
        assert_eq!(TransactionRecord::from_row(&row).unwrap(), record);
    }

    #[test]
    fn test_tags_are_linked_in_order() {
        let tags = TxTagRecord::for_transaction(&tx(), 7);
        let links: Vec<_> = tags.iter().map(|t| (t.tag_index, t.next_tag_index)).collect();
        assert_eq!(links, vec![(0, Some(1)), (1, Some(2)), (2, None)]);
        assert_eq!(TxTagRecord::from_row(&tags[1].to_row()).unwrap(), tags[1]);
    }
}
