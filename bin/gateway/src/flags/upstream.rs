//! Upstream peer flags.

use clap::Args;
use std::{ffi::OsString, time::Duration};
use weave_peers::{PeerConfig, PeerSelector};
use weave_sources::{HttpUpstream, HttpUpstreamConfig};

/// Where blocks and transactions are fetched from.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct UpstreamArgs {
    /// JSON array of upstream node urls.
    #[arg(long = "arweave.nodes", env = "ARWEAVE_NODES")]
    pub nodes: String,
    /// JSON array of trusted node urls, preferred until the weights settle.
    #[arg(long = "arweave.bootstrap-nodes", env = "ARWEAVE_BOOTSTRAP_NODES")]
    pub bootstrap_nodes: Option<String>,
    /// Request timeout in seconds. Transaction bodies get twice as long.
    #[arg(long = "http.timeout", env = "HTTP_TIMEOUT_SECONDS", default_value_t = 15)]
    pub http_timeout: u64,
}

impl UpstreamArgs {
    /// Builds the HTTP upstream client over a fresh peer table.
    pub fn build(&self) -> anyhow::Result<HttpUpstream> {
        let peers = PeerConfig::from_json(&self.nodes, self.bootstrap_nodes.as_deref())?;
        if peers.is_empty() {
            anyhow::bail!("ARWEAVE_NODES lists no upstream nodes");
        }
        let config = HttpUpstreamConfig {
            timeout: Duration::from_secs(self.http_timeout),
            ..Default::default()
        };
        Ok(HttpUpstream::new(PeerSelector::new(peers), config)?)
    }

    /// The flags that hand the same upstream to a worker process.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--arweave.nodes".into(), self.nodes.clone().into()];
        if let Some(bootstrap) = &self.bootstrap_nodes {
            args.extend(["--arweave.bootstrap-nodes".into(), bootstrap.clone().into()]);
        }
        args.extend(["--http.timeout".into(), self.http_timeout.to_string().into()]);
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        upstream: UpstreamArgs,
    }

    #[test]
    fn test_worker_args_round_trip() {
        let upstream = UpstreamArgs {
            nodes: r#"["http://a:1984"]"#.into(),
            bootstrap_nodes: Some(r#"["http://b:1984"]"#.into()),
            http_timeout: 7,
        };
        let mut argv: Vec<OsString> = vec!["test".into()];
        argv.extend(upstream.to_args());
        assert_eq!(TestCli::parse_from(argv).upstream, upstream);
    }

    #[test]
    fn test_build_rejects_an_empty_peer_list() {
        let upstream =
            UpstreamArgs { nodes: "[]".into(), bootstrap_nodes: None, http_timeout: 15 };
        assert!(upstream.build().is_err());
    }

    #[test]
    fn test_build_rejects_malformed_json() {
        let upstream =
            UpstreamArgs { nodes: "http://a".into(), bootstrap_nodes: None, http_timeout: 15 };
        assert!(upstream.build().is_err());
    }
}
