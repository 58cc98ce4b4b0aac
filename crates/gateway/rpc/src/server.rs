//! The [`GatewayApiServer`] implementation.

use crate::{GatewayApiServer, Metrics};
use async_trait::async_trait;
use jsonrpsee::core::RpcResult;
use serde::{Deserialize, Serialize};
use weave_sync::{GatewayStatus, Health, SyncStateHandle};

/// A healthcheck response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthzResponse {
    /// The application version.
    pub version: String,
    /// Whether the gateway has imported anything yet.
    pub status: Health,
}

/// Serves the status of a running sync.
#[derive(Debug, Clone)]
pub struct GatewayRpc {
    state: SyncStateHandle,
}

impl GatewayRpc {
    /// Constructs a new [`GatewayRpc`] reading `state`.
    pub const fn new(state: SyncStateHandle) -> Self {
        Self { state }
    }
}

#[async_trait]
impl GatewayApiServer for GatewayRpc {
    async fn status(&self) -> RpcResult<GatewayStatus> {
        weave_macros::inc!(counter, Metrics::RPC_CALLS, "method", "gateway_status");
        Ok(self.state.status())
    }

    async fn healthz(&self) -> RpcResult<HealthzResponse> {
        weave_macros::inc!(counter, Metrics::RPC_CALLS, "method", "gateway_healthz");
        Ok(HealthzResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: self.state.status().status,
        })
    }
}
