//! The persisted sync status.

use super::{GATEWAY_STATUS, Record};
use crate::{Row, StoreError, TableSchema};

/// The last sync status written by the orchestrator, for operators.
///
/// Resumption never reads it back; the store itself is the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GatewayStatusRecord {
    /// The keyspace the status belongs to.
    pub keyspace: String,
    /// The session of the process that wrote the row.
    pub session_id: String,
    /// The orchestrator phase.
    pub phase: String,
    /// The highest imported height.
    pub gateway_height: u64,
    /// The upstream height.
    pub arweave_height: u64,
    /// The hash of the highest imported block.
    pub top_hash: Option<String>,
    /// Seconds since the unix epoch.
    pub updated_at: u64,
}

impl Record for GatewayStatusRecord {
    fn schema() -> TableSchema {
        TableSchema::new(GATEWAY_STATUS, &["keyspace"], &[])
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("keyspace", self.keyspace.as_str())
            .with("session_id", self.session_id.as_str())
            .with("phase", self.phase.as_str())
            .with("gateway_height", self.gateway_height)
            .with("arweave_height", self.arweave_height)
            .with_opt("top_hash", self.top_hash.clone())
            .with("updated_at", self.updated_at)
    }

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            keyspace: row.text("keyspace")?.to_string(),
            session_id: row.text("session_id")?.to_string(),
            phase: row.text("phase")?.to_string(),
            gateway_height: row.long("gateway_height")?,
            arweave_height: row.long("arweave_height")?,
            top_hash: row.opt_text("top_hash")?.map(str::to_string),
            updated_at: row.opt_long("updated_at")?.unwrap_or_default(),
        })
    }
}
