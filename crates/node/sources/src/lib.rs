#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod error;
pub use error::FetchError;

mod retry;
pub use retry::{LinearBackoff, LinearBuilder, RetryPolicy};

mod traits;
#[cfg(any(test, feature = "test-utils"))]
pub use traits::MockUpstreamClient;
pub use traits::UpstreamClient;

mod http;
pub use http::{DEFAULT_TIMEOUT, HttpUpstream, HttpUpstreamConfig};

mod metrics;
pub use metrics::Metrics;

#[cfg(any(test, feature = "test-utils"))]
mod test_utils;
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::TestUpstream;
