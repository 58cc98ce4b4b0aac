//! The configured peer list.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// An error parsing a peer list.
#[derive(Debug, Error)]
pub enum PeerConfigError {
    /// The list is not a JSON array of strings.
    #[error("peer list is not a JSON array of urls: {0}")]
    Json(#[from] serde_json::Error),
    /// An entry is not a valid url.
    #[error("invalid peer url {url:?}: {source}")]
    Url {
        /// The offending entry.
        url: String,
        /// The parse failure.
        source: url::ParseError,
    },
}

/// The static peer list the weight table is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peers that start at the default weight.
    pub peers: Vec<Url>,
    /// A small trusted set that starts at the bootstrap weight.
    pub bootstrap: Vec<Url>,
}

impl PeerConfig {
    /// Creates a config from already parsed urls.
    pub const fn new(peers: Vec<Url>, bootstrap: Vec<Url>) -> Self {
        Self { peers, bootstrap }
    }

    /// Parses the JSON arrays carried by the `ARWEAVE_NODES` and `ARWEAVE_BOOTSTRAP_NODES`
    /// environment variables.
    pub fn from_json(peers: &str, bootstrap: Option<&str>) -> Result<Self, PeerConfigError> {
        Ok(Self {
            peers: parse_list(peers)?,
            bootstrap: bootstrap.map(parse_list).transpose()?.unwrap_or_default(),
        })
    }

    /// Returns every configured endpoint once, bootstrap peers first, with a flag telling
    /// whether the endpoint is a bootstrap peer.
    pub fn endpoints(&self) -> impl Iterator<Item = (&Url, bool)> {
        let bootstrap = self.bootstrap.iter().map(|url| (url, true));
        let peers = self.peers.iter().map(|url| (url, false));
        let mut seen = Vec::<&Url>::new();
        bootstrap.chain(peers).filter(move |(url, _)| {
            if seen.contains(url) {
                return false;
            }
            seen.push(url);
            true
        })
    }

    /// Returns `true` if no endpoint is configured.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty() && self.bootstrap.is_empty()
    }
}

fn parse_list(raw: &str) -> Result<Vec<Url>, PeerConfigError> {
    let entries: Vec<String> = serde_json::from_str(raw)?;
    entries
        .into_iter()
        .map(|entry| {
            Url::parse(entry.trim())
                .map_err(|source| PeerConfigError::Url { url: entry.clone(), source })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let config = PeerConfig::from_json(
            r#"["http://a:1984", "http://b:1984"]"#,
            Some(r#"["http://b:1984", "http://c:1984"]"#),
        )
        .unwrap();
        let endpoints: Vec<_> = config.endpoints().map(|(u, b)| (u.as_str().to_string(), b)).collect();
        assert_eq!(
            endpoints,
            vec![
                ("http://b:1984/".to_string(), true),
                ("http://c:1984/".to_string(), true),
                ("http://a:1984/".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_from_json_rejects_bad_entries() {
        assert!(matches!(PeerConfig::from_json("{}", None), Err(PeerConfigError::Json(_))));
        assert!(matches!(
            PeerConfig::from_json(r#"["not a url"]"#, None),
            Err(PeerConfigError::Url { .. })
        ));
    }
}
