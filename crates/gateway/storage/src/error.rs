//! Storage errors.

use thiserror::Error;
use weave_protocol::{CoercionError, IndexError};

/// An error from the storage adapter or a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table has not been created.
    #[error("unknown table {0}")]
    UnknownTable(String),
    /// A row lacks a key or a required column.
    #[error("missing column {0}")]
    MissingColumn(String),
    /// A cell holds a value of the wrong type.
    #[error("column {column}: expected {expected}")]
    Type {
        /// The column.
        column: String,
        /// The expected type.
        expected: &'static str,
    },
    /// A different block is already indexed at this height.
    #[error("height {height} is already indexed as {stored}, refusing {incoming}")]
    HeightConflict {
        /// The height.
        height: u64,
        /// The hash already stored.
        stored: String,
        /// The hash being imported.
        incoming: String,
    },
    /// A numeric value could not be coerced.
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    /// A transaction index could not be computed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// A stored value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
    /// The backend failed.
    #[error("backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Backend(err.into_string())
    }
}
