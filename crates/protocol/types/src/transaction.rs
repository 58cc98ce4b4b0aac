//! The upstream transaction payload.

use crate::lenient_u256;
use alloy_primitives::U256;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

/// The `Content-Type` of a path manifest.
pub const MANIFEST_CONTENT_TYPE: &str = "application/x.arweave-manifest+json";

/// A name/value tag, stored exactly as upstream sent it (base64url).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tag {
    /// The base64url encoded tag name.
    pub name: String,
    /// The base64url encoded tag value.
    pub value: String,
}

impl Tag {
    /// Builds a tag from plain UTF-8 name and value, encoding both.
    pub fn from_utf8(name: &str, value: &str) -> Self {
        Self { name: URL_SAFE_NO_PAD.encode(name), value: URL_SAFE_NO_PAD.encode(value) }
    }

    /// Decodes the tag name, lossily mapping invalid UTF-8.
    pub fn decoded_name(&self) -> Option<String> {
        decode_lossy(&self.name)
    }

    /// Decodes the tag value, lossily mapping invalid UTF-8.
    pub fn decoded_value(&self) -> Option<String> {
        decode_lossy(&self.value)
    }
}

fn decode_lossy(raw: &str) -> Option<String> {
    URL_SAFE_NO_PAD
        .decode(raw.trim_end_matches('='))
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// A transaction as returned by `GET /tx/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// The transaction format version.
    #[serde(default = "default_format")]
    pub format: u8,
    /// The transaction id.
    pub id: String,
    /// The anchor.
    #[serde(default)]
    pub last_tx: String,
    /// The owner's public key modulus.
    #[serde(default)]
    pub owner: String,
    /// Ordered tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// The recipient wallet. Empty when the transaction carries no transfer.
    #[serde(default)]
    pub target: String,
    /// The transferred amount in winston.
    #[serde(default, with = "lenient_u256")]
    pub quantity: U256,
    /// The payload size in bytes.
    #[serde(default, with = "lenient_u256")]
    pub data_size: U256,
    /// The payload merkle root. Empty for format 1 transactions without data.
    #[serde(default)]
    pub data_root: String,
    /// The fee in winston.
    #[serde(default, with = "lenient_u256")]
    pub reward: U256,
    /// The signature.
    #[serde(default)]
    pub signature: String,
    /// The bundle this item was unpacked from, assigned by a bundle post-processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundled_in: Option<String>,
}

const fn default_format() -> u8 {
    1
}

impl Transaction {
    /// The recipient, if any.
    pub fn target(&self) -> Option<&str> {
        non_empty(&self.target)
    }

    /// The data root, if any.
    pub fn data_root(&self) -> Option<&str> {
        non_empty(&self.data_root)
    }

    /// The bundle this item belongs to, if any.
    pub fn bundled_in(&self) -> Option<&str> {
        self.bundled_in.as_deref().and_then(non_empty)
    }

    /// Returns `true` if the transaction carries a payload.
    pub fn has_data(&self) -> bool {
        !self.data_size.is_zero()
    }

    /// Finds the first tag with the given decoded name and returns its decoded value.
    pub fn tag_value(&self, name: &str) -> Option<String> {
        self.tags.iter().find(|t| t.decoded_name().as_deref() == Some(name))?.decoded_value()
    }

    /// Returns `true` if the transaction is tagged as a path manifest.
    pub fn is_manifest(&self) -> bool {
        self.tag_value("Content-Type").is_some_and(|ct| ct == MANIFEST_CONTENT_TYPE)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}
