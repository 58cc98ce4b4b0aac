//! Manifest queue and manifest records.

use super::{MANIFEST, MANIFEST_QUEUE, Record};
use crate::{KeyPart, Row, StoreError, TableSchema};
use derive_more::Display;
use weave_protocol::{ManifestIndex, ManifestPath, PathManifest};

/// The queue partition a manifest sits in.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestState {
    /// Waiting to be resolved.
    #[display("pending")]
    Pending,
    /// Gave up after too many attempts.
    #[display("failed")]
    Failed,
}

impl ManifestState {
    /// The partition key of the state.
    pub fn partition(self) -> Vec<KeyPart> {
        vec![KeyPart::Text(self.to_string())]
    }

    fn parse(raw: &str) -> Result<Self, StoreError> {
        match raw {
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            _ => Err(StoreError::Type { column: "state".into(), expected: "manifest state" }),
        }
    }
}

/// A manifest transaction waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestQueueRecord {
    /// The queue partition.
    pub state: ManifestState,
    /// The manifest transaction.
    pub tx_id: String,
    /// The height the transaction was imported at.
    pub block_height: u64,
    /// Failed resolution attempts so far.
    pub attempts: u64,
    /// The last failure.
    pub last_error: Option<String>,
}

impl ManifestQueueRecord {
    /// A fresh pending entry.
    pub fn pending(tx_id: impl Into<String>, block_height: u64) -> Self {
        Self {
            state: ManifestState::Pending,
            tx_id: tx_id.into(),
            block_height,
            attempts: 0,
            last_error: None,
        }
    }
}

impl Record for ManifestQueueRecord {
    fn schema() -> TableSchema {
        TableSchema::new(MANIFEST_QUEUE, &["state"], &["tx_id"])
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("state", self.state.to_string())
            .with("tx_id", self.tx_id.as_str())
            .with("block_height", self.block_height)
            .with("attempts", self.attempts)
            .with_opt("last_error", self.last_error.clone())
    }

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            state: ManifestState::parse(row.text("state")?)?,
            tx_id: row.text("tx_id")?.to_string(),
            block_height: row.long("block_height")?,
            attempts: row.opt_long("attempts")?.unwrap_or_default(),
            last_error: row.opt_text("last_error")?.map(str::to_string),
        })
    }
}

/// A resolved path manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    /// The manifest transaction.
    pub tx_id: String,
    /// The parsed manifest.
    pub manifest: PathManifest,
}

impl Record for ManifestRecord {
    fn schema() -> TableSchema {
        TableSchema::new(MANIFEST, &["tx_id"], &[])
    }

    fn to_row(&self) -> Row {
        let paths: Vec<(String, String)> = self
            .manifest
            .paths
            .iter()
            .map(|(path, entry)| (path.clone(), entry.id.clone()))
            .collect();
        Row::new()
            .with("tx_id", self.tx_id.as_str())
            .with("manifest", self.manifest.manifest.as_str())
            .with("version", self.manifest.version.as_str())
            .with_opt("index_path", self.manifest.index.as_ref().map(|index| index.path.clone()))
            .with_opt("index_id", self.manifest.index_id())
            .with("paths", paths)
    }

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        let manifest = PathManifest {
            manifest: row.text("manifest")?.to_string(),
            version: row.text("version")?.to_string(),
            index: row.opt_text("index_path")?.map(|path| ManifestIndex { path: path.to_string() }),
            paths: row
                .pairs("paths")?
                .into_iter()
                .map(|(path, id)| (path, ManifestPath { id }))
                .collect(),
        };
        Ok(Self { tx_id: row.text("tx_id")?.to_string(), manifest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_roundtrip() {
        let manifest = PathManifest::parse(
            br#"{"manifest":"arweave/paths","version":"0.1.0","index":{"path":"a"},"paths":{"a":{"id":"x"},"b/c":{"id":"y"}}}"#,
        )
        .unwrap();
        let record = ManifestRecord { tx_id: "m".into(), manifest };
        let row = record.to_row();
        assert_eq!(row.text("index_id").unwrap(), "x");
        assert_eq!(ManifestRecord::from_row(&row).unwrap(), record);
    }

    #[test]
    fn test_queue_row() {
        let entry = ManifestQueueRecord::pending("m", 3);
        let row = entry.to_row();
        assert_eq!(
            ManifestQueueRecord::schema().primary_key(&row).unwrap(),
            vec![KeyPart::from("pending"), KeyPart::from("m")]
        );
        assert_eq!(ManifestQueueRecord::from_row(&row).unwrap(), entry);
    }
}
