#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod config;
pub use config::{PeerConfig, PeerConfigError};

mod error;
pub use error::PeerError;

mod selector;
pub use selector::{
    BOOTSTRAP_WEIGHT, DEFAULT_WEIGHT, EVICTION_THRESHOLD, MAX_WEIGHT, MIN_WEIGHT, PeerSelector,
    PeerWeight,
};

mod metrics;
pub use metrics::Metrics;
