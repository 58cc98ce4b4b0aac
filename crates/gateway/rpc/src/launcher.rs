//! Runs the status server.

use crate::{GatewayApiServer, GatewayRpc};
use async_trait::async_trait;
use jsonrpsee::{
    RpcModule,
    server::{Server, ServerHandle, middleware::http::ProxyGetRequestLayer},
};
use std::{net::SocketAddr, time::Duration};
use tokio_util::sync::CancellationToken;
use weave_sync::{SyncActor, SyncStateHandle};

/// The default address of the status server.
pub const DEFAULT_STATUS_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
    3000,
);

/// The status server configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcConfig {
    /// The socket the server binds.
    pub socket: SocketAddr,
    /// Prevent the server from being restarted.
    pub no_restart: bool,
}

impl RpcConfig {
    /// Returns the number of times the server will be restarted if it stops.
    pub const fn restart_count(&self) -> u32 {
        if self.no_restart { 0 } else { 3 }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { socket: DEFAULT_STATUS_ADDR, no_restart: false }
    }
}

/// An error returned by the [`RpcActor`].
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Failed to register the gateway methods.
    #[error("Failed to register the gateway methods")]
    Register(#[from] jsonrpsee::core::RegisterMethodError),
    /// Failed to build the GET proxy.
    #[error("Failed to build the GET proxy: {0}")]
    Proxy(String),
    /// Failed to launch the server.
    #[error(transparent)]
    LaunchFailed(#[from] std::io::Error),
    /// The server stopped unexpectedly.
    #[error("RPC server stopped unexpectedly")]
    ServerStopped,
    /// Failed to stop the server.
    #[error("Failed to stop the RPC server")]
    StopFailed,
}

/// Launches the jsonrpsee [`Server`], returning the bound address and the server handle.
///
/// Besides JSON-RPC over `POST /`, `GET /status` and `GET /healthz` answer with the result of
/// `gateway_status` and `gateway_healthz`.
pub async fn launch(
    socket: SocketAddr,
    module: RpcModule<()>,
) -> Result<(SocketAddr, ServerHandle), RpcError> {
    let proxy =
        ProxyGetRequestLayer::new([("/status", "gateway_status"), ("/healthz", "gateway_healthz")])
            .map_err(|err| RpcError::Proxy(err.to_string()))?;
    let middleware = tower::ServiceBuilder::new().layer(proxy).timeout(Duration::from_secs(2));
    let server = Server::builder().set_http_middleware(middleware).build(socket).await?;
    let addr = server.local_addr()?;
    info!(target: "rpc", %addr, "RPC server bound to address");
    Ok((addr, server.start(module)))
}

/// An actor serving the gateway status until cancelled.
#[derive(Debug)]
pub struct RpcActor {
    config: RpcConfig,
    state: SyncStateHandle,
}

impl RpcActor {
    /// Constructs a new [`RpcActor`] serving `state`.
    pub const fn new(config: RpcConfig, state: SyncStateHandle) -> Self {
        Self { config, state }
    }
}

#[async_trait]
impl SyncActor for RpcActor {
    type Error = RpcError;
    type StartData = CancellationToken;

    async fn start(self, cancellation: CancellationToken) -> Result<(), RpcError> {
        let mut module = RpcModule::new(());
        module.merge(GatewayRpc::new(self.state).into_rpc())?;

        let (_, mut handle) = launch(self.config.socket, module.clone()).await?;
        for _ in 0..=self.config.restart_count() {
            tokio::select! {
                _ = handle.clone().stopped() => {
                    match launch(self.config.socket, module.clone()).await {
                        Ok((_, restarted)) => handle = restarted,
                        Err(err) => {
                            error!(target: "rpc", %err, "Failed to relaunch the rpc server");
                            return Err(RpcError::ServerStopped);
                        }
                    }
                }
                _ = cancellation.cancelled() => {
                    handle.stop().map_err(|_| RpcError::StopFailed)?;
                    handle.stopped().await;
                    info!(target: "rpc", "RPC server stopped");
                    return Ok(());
                }
            }
        }

        error!(target: "rpc", restarts = self.config.restart_count(), "RPC server keeps stopping");
        Err(RpcError::ServerStopped)
    }
}
