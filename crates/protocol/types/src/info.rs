//! Node info, transaction offsets and chunks.

use crate::{ChunkDecodeError, CoercionError, Numeric, lenient_u64, lenient_u256};
use alloy_primitives::U256;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The response of `GET /info`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeInfo {
    /// The network name.
    #[serde(default)]
    pub network: String,
    /// The node version.
    #[serde(default)]
    pub version: u64,
    /// The node release.
    #[serde(default)]
    pub release: u64,
    /// The height of the node's current block.
    #[serde(with = "lenient_u64")]
    pub height: u64,
    /// The independent hash of the node's current block.
    pub current: String,
    /// The number of blocks the node knows about.
    #[serde(default)]
    pub blocks: u64,
    /// The number of peers the node is connected to.
    #[serde(default)]
    pub peers: u64,
    /// The node's queue length.
    #[serde(default)]
    pub queue_length: u64,
    /// The node's state latency.
    #[serde(default)]
    pub node_state_latency: u64,
}

/// The response of `GET /tx/:id/offset`.
///
/// `offset` is the absolute weave offset of the *last* byte of the transaction data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxOffset {
    /// The data size.
    #[serde(with = "lenient_u256")]
    pub size: U256,
    /// The absolute end offset.
    #[serde(with = "lenient_u256")]
    pub offset: U256,
}

impl TxOffset {
    /// Returns the inclusive absolute byte range `(start, end)` of the data.
    pub fn range(&self) -> Result<(u64, u64), CoercionError> {
        let end = Numeric::Big(self.offset).coerce_u64()?;
        let size = Numeric::Big(self.size).coerce_u64()?;
        let start = (end + 1)
            .checked_sub(size)
            .ok_or_else(|| CoercionError::Overflow(format!("size {size} exceeds offset {end}")))?;
        Ok((start, end))
    }
}

/// The response of `GET /chunk/:offset`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chunk {
    /// The base64url chunk bytes.
    pub chunk: String,
    /// The base64url data path proof.
    #[serde(default)]
    pub data_path: String,
    /// The base64url transaction path proof.
    #[serde(default)]
    pub tx_path: String,
}

impl Chunk {
    /// Wraps raw bytes, without proofs.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self { chunk: URL_SAFE_NO_PAD.encode(bytes), ..Default::default() }
    }

    /// Decodes the chunk payload.
    pub fn decode(&self) -> Result<Bytes, ChunkDecodeError> {
        Ok(Bytes::from(URL_SAFE_NO_PAD.decode(self.chunk.trim_end_matches('='))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_range() {
        let offset: TxOffset = serde_json::from_str(r#"{"size":"10","offset":"109"}"#).unwrap();
        assert_eq!(offset.range().unwrap(), (100, 109));
    }

    #[test]
    fn test_offset_range_rejects_inconsistent_size() {
        let offset = TxOffset { size: U256::from(20u64), offset: U256::from(5u64) };
        assert!(offset.range().is_err());
    }

    #[test]
    fn test_chunk_decode() {
        let chunk = Chunk { chunk: "aGVsbG8".into(), ..Default::default() };
        assert_eq!(chunk.decode().unwrap(), Bytes::from_static(b"hello"));
        let bad = Chunk { chunk: "***".into(), ..Default::default() };
        assert!(bad.decode().is_err());
    }

    #[test]
    fn test_info_accepts_string_height() {
        let info: NodeInfo =
            serde_json::from_str(r#"{"network":"arweave.N.1","height":"12","current":"h"}"#)
                .unwrap();
        assert_eq!(info.height, 12);
        assert_eq!(info.current, "h");
    }
}
