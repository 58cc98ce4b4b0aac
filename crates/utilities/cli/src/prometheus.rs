//! Utilities for spinning up a prometheus metrics server.

use crate::PrometheusError;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{IpAddr, SocketAddr, TcpListener};
use tracing::info;

/// Starts a Prometheus metrics server on the given address and port, returning where it listens.
///
/// Port `0` asks the OS for a free port.
pub fn init_prometheus_server(addr: IpAddr, metrics_port: u16) -> Result<SocketAddr, PrometheusError> {
    let actual_addr = if metrics_port == 0 {
        let listener = TcpListener::bind((addr, 0))?;
        let bound = listener.local_addr()?;
        drop(listener);
        bound
    } else {
        SocketAddr::from((addr, metrics_port))
    };

    PrometheusBuilder::new().with_http_listener(actual_addr).install()?;
    info!(target: "prometheus", "Serving metrics at: http://{}", actual_addr);
    Ok(actual_addr)
}
