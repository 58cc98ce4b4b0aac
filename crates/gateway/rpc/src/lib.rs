#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod api;
pub use api::GatewayApiServer;

mod server;
pub use server::{GatewayRpc, HealthzResponse};

mod launcher;
pub use launcher::{DEFAULT_STATUS_ADDR, RpcActor, RpcConfig, RpcError, launch};

mod metrics;
pub use metrics::Metrics;
