//! Table layouts and the records stored in them.
//!
//! Every table has a record type with a pure mapping to and from a [`Row`]. Optional upstream
//! fields map to `Option`s and unset options are simply not written, so a row only carries what
//! upstream sent.

use crate::{Order, Row, StoreError, TableSchema};

mod block;
pub use block::{BlockPoaRecord, BlockRecord, HeightSortedRecord, HeightToHashRecord};

mod transaction;
pub use transaction::{TransactionRecord, TxIdSortedRecord, TxOffsetRecord, TxTagRecord};

mod gql;
pub use gql::{FilterSet, GqlField, GqlProjection};

mod manifest;
pub use manifest::{ManifestQueueRecord, ManifestRecord, ManifestState};

mod status;
pub use status::GatewayStatusRecord;

/// `block`: the primary block record, by hash.
pub const BLOCK: &str = "block";
/// `block_poa`: the proof of access of a block, by hash.
pub const BLOCK_POA: &str = "block_poa";
/// `block_height_to_hash`: the height index, bucketed by height. The presence marker of a fully
/// imported block.
pub const BLOCK_HEIGHT_TO_HASH: &str = "block_height_to_hash";
/// `block_height_sorted_asc`: blocks by ascending height, bucketed by height.
pub const BLOCK_HEIGHT_SORTED_ASC: &str = "block_height_sorted_asc";
/// `block_height_sorted_desc`: blocks by descending height, bucketed by height.
pub const BLOCK_HEIGHT_SORTED_DESC: &str = "block_height_sorted_desc";
/// `transaction`: the primary transaction record, by id.
pub const TRANSACTION: &str = "transaction";
/// `tx_id_sorted_asc`: transaction ids by ascending index, bucketed by index.
pub const TX_ID_SORTED_ASC: &str = "tx_id_sorted_asc";
/// `tx_id_sorted_desc`: transaction ids by descending index, bucketed by index.
pub const TX_ID_SORTED_DESC: &str = "tx_id_sorted_desc";
/// `tx_tag`: one row per transaction tag, bucketed by index.
pub const TX_TAG: &str = "tx_tag";
/// `tx_offset`: size and end offset of transactions with data, by id.
pub const TX_OFFSET: &str = "tx_offset";
/// `manifest_queue`: manifests awaiting import, by state.
pub const MANIFEST_QUEUE: &str = "manifest_queue";
/// `manifest`: imported path manifests, by id.
pub const MANIFEST: &str = "manifest";
/// `gateway_status`: the last known sync status, one row per keyspace.
pub const GATEWAY_STATUS: &str = "gateway_status";

/// A typed row of one table.
pub trait Record: Sized {
    /// The table the record is stored in.
    fn schema() -> TableSchema;

    /// Maps the record to a row.
    fn to_row(&self) -> Row;

    /// Maps a stored row back to the record.
    fn from_row(row: &Row) -> Result<Self, StoreError>;
}

/// Every table the gateway writes: the fixed tables followed by the GQL projections.
pub fn schemas() -> Vec<TableSchema> {
    let mut schemas = vec![
        BlockRecord::schema(),
        BlockPoaRecord::schema(),
        HeightToHashRecord::schema(),
        HeightSortedRecord::schema_for(Order::Asc),
        HeightSortedRecord::schema_for(Order::Desc),
        TransactionRecord::schema(),
        TxIdSortedRecord::schema_for(Order::Asc),
        TxIdSortedRecord::schema_for(Order::Desc),
        TxTagRecord::schema(),
        TxOffsetRecord::schema(),
        ManifestQueueRecord::schema(),
        ManifestRecord::schema(),
        GatewayStatusRecord::schema(),
    ];
    schemas.extend(GqlProjection::all().map(|projection| projection.schema()));
    schemas
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_names_are_unique() {
        let schemas = schemas();
        assert_eq!(schemas.len(), 13 + 128);
        let names: HashSet<_> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), schemas.len());
    }
}
