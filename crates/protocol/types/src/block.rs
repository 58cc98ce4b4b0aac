//! The upstream block payload.

use crate::{Tag, lenient_u64, lenient_u256};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// A block as returned by `GET /block/height/:height` and `GET /block/hash/:hash`.
///
/// Fields that older peers or older blocks may omit are `Option`s, so that a row built from the
/// block only carries what upstream actually sent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    /// The independent hash of the block. Identity for fork detection.
    pub indep_hash: String,
    /// The height of the block.
    #[serde(with = "lenient_u64")]
    pub height: u64,
    /// The independent hash of the parent block. Empty for genesis.
    #[serde(default)]
    pub previous_block: String,
    /// Block timestamp in seconds since the unix epoch.
    #[serde(default, with = "lenient_u64")]
    pub timestamp: u64,
    /// The ids of the transactions in the block, in block order.
    #[serde(default)]
    pub txs: Vec<String>,
    /// The mining nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// The proof-of-work hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Timestamp of the last difficulty retarget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_retarget: Option<u64>,
    /// The mining difficulty.
    #[serde(default, with = "lenient_u256::option", skip_serializing_if = "Option::is_none")]
    pub diff: Option<U256>,
    /// The cumulative difficulty up to this block.
    #[serde(default, with = "lenient_u256::option", skip_serializing_if = "Option::is_none")]
    pub cumulative_diff: Option<U256>,
    /// The address that receives the mining reward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_addr: Option<String>,
    /// The endowment pool size.
    #[serde(default, with = "lenient_u256::option", skip_serializing_if = "Option::is_none")]
    pub reward_pool: Option<U256>,
    /// The total size of the weave, in bytes.
    #[serde(default, with = "lenient_u256::option", skip_serializing_if = "Option::is_none")]
    pub weave_size: Option<U256>,
    /// The size of the data added by this block, in bytes.
    #[serde(default, with = "lenient_u256::option", skip_serializing_if = "Option::is_none")]
    pub block_size: Option<U256>,
    /// Merkle root of the transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_root: Option<String>,
    /// Hash of the wallet list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_list: Option<String>,
    /// Merkle root of the block hash list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_list_merkle: Option<String>,
    /// Miner-provided block tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    /// The proof of access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poa: Option<ProofOfAccess>,
}

impl Block {
    /// Returns `true` if `self` directly extends `parent`.
    pub fn extends(&self, parent: &Self) -> bool {
        self.height == parent.height + 1 && self.previous_block == parent.indep_hash
    }

    /// Returns `true` if this is the genesis block.
    pub const fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

/// The proof of access embedded in a block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProofOfAccess {
    /// The recall option.
    #[serde(default)]
    pub option: String,
    /// The merkle path to the transaction.
    #[serde(default)]
    pub tx_path: String,
    /// The merkle path to the chunk.
    #[serde(default)]
    pub data_path: String,
    /// The recalled chunk.
    #[serde(default)]
    pub chunk: String,
}

impl ProofOfAccess {
    /// Returns `true` if every field is empty. Pre-PoA blocks carry an empty proof.
    pub fn is_empty(&self) -> bool {
        self.option.is_empty()
            && self.tx_path.is_empty()
            && self.data_path.is_empty()
            && self.chunk.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_JSON: &str = r#"{
        "nonce": "W3Hm",
        "previous_block": "prev-hash",
        "timestamp": 1600000000,
        "last_retarget": 1599999000,
        "diff": "115792089237316195423570985008687907853269984665640564039457584007913129639935",
        "height": 500000,
        "hash": "pow-hash",
        "indep_hash": "block-hash",
        "txs": ["tx-a", "tx-b"],
        "tx_root": "",
        "wallet_list": "wl",
        "reward_addr": "unclaimed",
        "tags": [],
        "reward_pool": "1000",
        "weave_size": 12345,
        "block_size": "0",
        "poa": {"option": "1", "tx_path": "", "data_path": "", "chunk": ""}
    }"#;

    #[test]
    fn test_deserialize_upstream_block() {
        let block: Block = serde_json::from_str(BLOCK_JSON).unwrap();
        assert_eq!(block.height, 500_000);
        assert_eq!(block.indep_hash, "block-hash");
        assert_eq!(block.txs, vec!["tx-a".to_string(), "tx-b".to_string()]);
        assert_eq!(block.diff, Some(U256::MAX));
        assert_eq!(block.weave_size, Some(U256::from(12345u64)));
        assert_eq!(block.cumulative_diff, None);
        assert_eq!(block.poa.as_ref().map(|p| p.option.as_str()), Some("1"));
    }

    #[test]
    fn test_serde_roundtrip_preserves_absent_fields() {
        let block: Block = serde_json::from_str(BLOCK_JSON).unwrap();
        let encoded = serde_json::to_string(&block).unwrap();
        assert!(!encoded.contains("cumulative_diff"));
        let decoded: Block = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_extends() {
        let parent = Block { indep_hash: "a".into(), height: 9, ..Default::default() };
        let child = Block {
            indep_hash: "b".into(),
            height: 10,
            previous_block: "a".into(),
            ..Default::default()
        };
        assert!(child.extends(&parent));
        assert!(!parent.extends(&child));
    }
}
