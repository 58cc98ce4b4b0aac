//! Error types for the protocol primitives.

use thiserror::Error;

/// An error coercing an upstream numeric value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    /// The string is not a base-10 integer.
    #[error("not a decimal integer: {0:?}")]
    NotNumeric(String),
    /// The value does not fit in the requested integer width.
    #[error("value {0} does not fit in 64 bits")]
    Overflow(String),
}

/// An error computing a transaction index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
    /// The in-block position exceeds the per-block transaction limit.
    #[error("transaction position {position} exceeds the per-block limit of {max}")]
    PositionOutOfRange {
        /// The offending position.
        position: u64,
        /// The per-block limit.
        max: u64,
    },
    /// The index overflowed.
    #[error("transaction index overflow at height {0}")]
    Overflow(u64),
}

/// An error decoding a chunk payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkDecodeError {
    /// The chunk is not valid base64url.
    #[error("invalid base64url chunk payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// An error parsing a path manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// The body is not valid manifest JSON.
    #[error("invalid manifest json: {0}")]
    Json(String),
    /// The manifest kind is not `arweave/paths`.
    #[error("unsupported manifest kind {0:?}")]
    UnsupportedKind(String),
    /// The index path is not one of the manifest's paths.
    #[error("manifest index {0:?} is not a listed path")]
    MissingIndex(String),
}
