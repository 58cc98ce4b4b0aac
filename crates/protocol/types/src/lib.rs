//! # weave-protocol
//!
//! Core primitives shared by every crate of the gateway:
//!
//! - [`Block`] and [`Transaction`], mirroring the JSON returned by upstream peers.
//! - [`NodeInfo`], [`TxOffset`] and [`Chunk`], the remaining upstream payloads.
//! - [`PathManifest`], the JSON document carried by manifest transactions.
//! - [`Numeric`], the coercion rules for amounts that upstream encodes either as JSON numbers or
//!   as decimal strings. Amounts are kept as [`U256`](alloy_primitives::U256) so they round-trip
//!   exactly.
//! - The global transaction ordering key ([`tx_index`]) and the partition/bucket arithmetic
//!   ([`Bucketing`]) used to bound wide-column partitions.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use alloy_primitives::U256;

mod block;
pub use block::{Block, ProofOfAccess};

mod transaction;
pub use transaction::{MANIFEST_CONTENT_TYPE, Tag, Transaction};

mod manifest;
pub use manifest::{ManifestIndex, ManifestPath, PathManifest};

mod info;
pub use info::{Chunk, NodeInfo, TxOffset};

mod numeric;
pub use numeric::{Numeric, lenient_u64, lenient_u256};

mod index;
pub use index::{
    Bucketing, HEIGHT_BUCKET_SIZE, HEIGHT_PARTITION_SIZE, MAX_TX_PER_BLOCK, TX_INDEX_BUCKET_SIZE,
    TX_INDEX_PARTITION_SIZE, tx_index,
};

mod error;
pub use error::{ChunkDecodeError, CoercionError, IndexError, ManifestError};
