//! The `reqwest` backed [`UpstreamClient`].

use crate::{FetchError, RetryPolicy, UpstreamClient};
use async_trait::async_trait;
use backon::Retryable;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;
use weave_peers::PeerSelector;
use weave_protocol::{Block, Chunk, NodeInfo, Transaction, TxOffset};

/// The default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for [`HttpUpstream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpUpstreamConfig {
    /// Timeout of a single request. Transaction bodies and the hash list get twice this.
    pub timeout: Duration,
    /// The retry policy shared by every fetcher.
    pub retry: RetryPolicy,
}

impl Default for HttpUpstreamConfig {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT, retry: RetryPolicy::default() }
    }
}

/// Fetches from upstream peers over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    peers: PeerSelector,
    config: HttpUpstreamConfig,
}

impl HttpUpstream {
    /// Creates a new client that selects peers through `peers`.
    pub fn new(peers: PeerSelector, config: HttpUpstreamConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("weave-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| FetchError::Client(err.to_string()))?;
        Ok(Self { client, peers, config })
    }

    /// Returns the peer selector.
    pub const fn peers(&self) -> &PeerSelector {
        &self.peers
    }

    fn endpoint(peer: &Url, path: &str) -> Result<Url, FetchError> {
        let base = peer.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{path}")).map_err(|err| FetchError::InvalidUrl(err.to_string()))
    }

    /// Sends one request to one peer and reports the outcome to the selector.
    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<T, FetchError> {
        let peer = self.peers.select()?;
        let url = Self::endpoint(&peer, path)?;

        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(&peer, transport(&peer, err))),
        };
        let status = response.status();
        if !status.is_success() {
            let err = FetchError::Status {
                peer: peer.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
            };
            return Err(self.fail(&peer, err));
        }
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => return Err(self.fail(&peer, transport(&peer, err))),
        };
        match serde_json::from_slice(&body) {
            Ok(value) => {
                self.peers.report_success(&peer);
                weave_macros::inc!(counter, crate::Metrics::REQUESTS, "outcome", "success");
                Ok(value)
            }
            Err(err) => {
                let err = FetchError::Decode {
                    peer: peer.to_string(),
                    path: path.to_string(),
                    reason: err.to_string(),
                };
                Err(self.fail(&peer, err))
            }
        }
    }

    fn fail(&self, peer: &Url, err: FetchError) -> FetchError {
        self.peers.report_failure(peer, err.is_severe());
        weave_macros::inc!(counter, crate::Metrics::REQUESTS, "outcome", "failure");
        err
    }

    /// Retries [`Self::get_once`] according to the retry policy.
    ///
    /// Retryable failures that survive every attempt become [`FetchError::Exhausted`]. Anything
    /// else, such as running out of peers, stops the loop immediately.
    async fn get<T: DeserializeOwned>(
        &self,
        what: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<T, FetchError> {
        let result = (|| self.get_once::<T>(path, timeout))
            .retry(self.config.retry.backoff())
            .when(FetchError::is_retryable)
            .notify(|err, after| {
                debug!(target: "sources", %err, ?after, what, "Retrying upstream request");
            })
            .await;

        match result {
            Err(err) if err.is_retryable() => {
                warn!(target: "sources", %err, what, "Upstream request exhausted its retries");
                weave_macros::inc!(counter, crate::Metrics::EXHAUSTED, "resource", what.to_string());
                Err(FetchError::Exhausted {
                    what: what.to_string(),
                    attempts: self.config.retry.max_attempts,
                })
            }
            other => other,
        }
    }

    /// Like [`Self::get`], but exhaustion yields `Ok(None)`.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        what: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<Option<T>, FetchError> {
        match self.get(what, path, timeout).await {
            Ok(value) => Ok(Some(value)),
            Err(FetchError::Exhausted { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    const fn body_timeout(&self) -> Duration {
        self.config.timeout.saturating_mul(2)
    }
}

fn transport(peer: &Url, err: reqwest::Error) -> FetchError {
    FetchError::Transport { peer: peer.to_string(), reason: err.to_string() }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn fetch_info(&self) -> Result<NodeInfo, FetchError> {
        self.get("info", "info", self.config.timeout).await
    }

    async fn fetch_hash_list(&self) -> Result<Vec<String>, FetchError> {
        let mut hashes: Vec<String> = self.get("hash list", "hash_list", self.body_timeout()).await?;
        hashes.reverse();
        Ok(hashes)
    }

    async fn fetch_block_by_hash(&self, hash: &str) -> Result<Block, FetchError> {
        self.get(&format!("block {hash}"), &format!("block/hash/{hash}"), self.config.timeout)
            .await
    }

    async fn fetch_block_by_height(&self, height: u64) -> Result<Block, FetchError> {
        let block: Block = self
            .get(&format!("block {height}"), &format!("block/height/{height}"), self.config.timeout)
            .await?;
        if block.height != height {
            error!(
                target: "sources",
                requested = height,
                received = block.height,
                "Peer returned a block at the wrong height"
            );
            return Err(FetchError::HeightMismatch { requested: height, received: block.height });
        }
        Ok(block)
    }

    async fn fetch_transaction(&self, id: &str) -> Result<Option<Transaction>, FetchError> {
        self.get_optional(&format!("tx {id}"), &format!("tx/{id}"), self.body_timeout()).await
    }

    async fn fetch_tx_offset(&self, id: &str) -> Result<Option<TxOffset>, FetchError> {
        self.get_optional(&format!("offset of {id}"), &format!("tx/{id}/offset"), self.config.timeout)
            .await
    }

    async fn fetch_chunk(&self, offset: u64) -> Result<Option<Chunk>, FetchError> {
        self.get_optional(&format!("chunk {offset}"), &format!("chunk/{offset}"), self.config.timeout)
            .await
    }
}
