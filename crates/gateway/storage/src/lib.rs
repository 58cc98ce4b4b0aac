#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod error;
pub use error::StoreError;

mod value;
pub use value::{KeyPart, Row, Value};

mod schema;
pub use schema::{Consistency, Order, Select, Statement, TableSchema};

mod traits;
#[cfg(any(test, feature = "test-utils"))]
pub use traits::MockTxPostProcessor;
pub use traits::{TxPostProcessor, WideColumnStore};

mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "rocksdb")]
mod rocks;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

pub mod tables;
pub use tables::{FilterSet, GqlField, GqlProjection, Record};

mod manifest;
pub use manifest::ManifestDetector;

mod store;
pub use store::GatewayStore;

mod metrics;
pub use metrics::Metrics;
