//! The `gateway` JSON-RPC namespace.

use crate::HealthzResponse;
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use weave_sync::GatewayStatus;

/// Read-only endpoints for operators and load balancers.
///
/// Default namespace separator is `_`, so the methods are served as `gateway_status` and
/// `gateway_healthz`.
#[rpc(server, namespace = "gateway")]
pub trait GatewayApi {
    /// The sync progress of the gateway.
    #[method(name = "status")]
    async fn status(&self) -> RpcResult<GatewayStatus>;

    /// Liveness of the server.
    #[method(name = "healthz")]
    async fn healthz(&self) -> RpcResult<HealthzResponse>;
}
