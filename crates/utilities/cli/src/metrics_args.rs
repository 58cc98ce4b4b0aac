//! Prometheus exporter arguments.

use crate::{CliResult, init_prometheus_server};
use clap::Args;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Where metrics are served, if at all.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsArgs {
    /// Port of the Prometheus exporter. Metrics are not served when unset.
    #[arg(long = "metrics.port", env = "METRICS_PORT")]
    pub port: Option<u16>,
    /// Address the Prometheus exporter binds to, all interfaces when unset.
    #[arg(long = "metrics.addr", env = "METRICS_ADDR")]
    pub addr: Option<IpAddr>,
}

impl MetricsArgs {
    /// Starts the exporter if a port was given, returning the bound address.
    pub fn init_metrics(&self) -> CliResult<Option<SocketAddr>> {
        let Some(port) = self.port else { return Ok(None) };
        let addr = self.addr.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        Ok(Some(init_prometheus_server(addr, port)?))
    }
}
