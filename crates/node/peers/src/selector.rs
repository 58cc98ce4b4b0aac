//! The weighted peer selector.

use crate::{PeerConfig, PeerError};
use parking_lot::Mutex;
use rand::distr::{Distribution, weighted::WeightedIndex};
use std::{collections::HashSet, sync::Arc};
use url::Url;

/// The lowest weight a peer can have.
pub const MIN_WEIGHT: u8 = 1;

/// The highest weight a peer can have.
pub const MAX_WEIGHT: u8 = 99;

/// The weight a regular peer starts at.
pub const DEFAULT_WEIGHT: u8 = 1;

/// The weight a bootstrap peer starts at.
pub const BOOTSTRAP_WEIGHT: u8 = 10;

/// A severe failure evicts a peer whose weight is at or below this value.
pub const EVICTION_THRESHOLD: u8 = 2;

/// A peer and its current weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerWeight {
    /// The peer endpoint.
    pub url: Url,
    /// The current weight, within `[MIN_WEIGHT, MAX_WEIGHT]`.
    pub weight: u8,
}

#[derive(Debug, Default)]
struct WeightTable {
    config: PeerConfig,
    peers: Vec<PeerWeight>,
    evicted: HashSet<Url>,
}

impl WeightTable {
    fn rebuild(&mut self) {
        self.peers = self
            .config
            .endpoints()
            .filter(|(url, _)| !self.evicted.contains(*url))
            .map(|(url, bootstrap)| PeerWeight {
                url: url.clone(),
                weight: if bootstrap { BOOTSTRAP_WEIGHT } else { DEFAULT_WEIGHT },
            })
            .collect();
        weave_macros::set!(gauge, crate::Metrics::ACTIVE_PEERS, self.peers.len());
        debug!(target: "peers", count = self.peers.len(), "Rebuilt peer weight table");
    }

    fn position(&self, url: &Url) -> Option<usize> {
        self.peers.iter().position(|p| &p.url == url)
    }
}

/// Selects upstream peers by weighted random choice and tracks their health.
///
/// The selector is cheap to clone; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct PeerSelector {
    table: Arc<Mutex<WeightTable>>,
}

impl PeerSelector {
    /// Creates a selector for the given peer list. The table is built lazily on first use.
    pub fn new(config: PeerConfig) -> Self {
        Self { table: Arc::new(Mutex::new(WeightTable { config, ..Default::default() })) }
    }

    /// Picks a peer, biased towards peers with a higher weight.
    ///
    /// An empty table is rebuilt from the configured list first. If that leaves it empty, every
    /// configured peer has been evicted (or none was configured) and [`PeerError::NoPeers`] is
    /// returned.
    pub fn select(&self) -> Result<Url, PeerError> {
        let mut table = self.table.lock();
        if table.peers.is_empty() {
            table.rebuild();
        }
        if table.peers.is_empty() {
            error!(target: "peers", "No peers left to select from");
            return Err(PeerError::NoPeers);
        }
        let weights = WeightedIndex::new(table.peers.iter().map(|p| u32::from(p.weight)))
            .map_err(|_| PeerError::NoPeers)?;
        let chosen = weights.sample(&mut rand::rng());
        Ok(table.peers[chosen].url.clone())
    }

    /// Raises the weight of `peer` by one, up to [`MAX_WEIGHT`].
    pub fn report_success(&self, peer: &Url) {
        let mut table = self.table.lock();
        if let Some(idx) = table.position(peer) {
            let entry = &mut table.peers[idx];
            entry.weight = entry.weight.saturating_add(1).min(MAX_WEIGHT);
        }
    }

    /// Lowers the weight of `peer` by one, down to [`MIN_WEIGHT`].
    ///
    /// A `severe` failure against a peer whose weight is at or below [`EVICTION_THRESHOLD`]
    /// evicts it. Evicted peers are not re-added when the table is rebuilt; only
    /// [`Self::sync_with_config`] with a changed list clears evictions.
    pub fn report_failure(&self, peer: &Url, severe: bool) {
        weave_macros::inc!(
            counter,
            crate::Metrics::PEER_FAILURES,
            "severity",
            if severe { "severe" } else { "soft" }
        );
        let mut table = self.table.lock();
        let Some(idx) = table.position(peer) else { return };
        let weight = table.peers[idx].weight;
        if severe && weight <= EVICTION_THRESHOLD {
            let removed = table.peers.remove(idx);
            warn!(target: "peers", peer = %removed.url, "Evicting unresponsive peer");
            table.evicted.insert(removed.url);
            weave_macros::inc!(counter, crate::Metrics::PEERS_EVICTED);
            weave_macros::set!(gauge, crate::Metrics::ACTIVE_PEERS, table.peers.len());
            return;
        }
        table.peers[idx].weight = weight.saturating_sub(1).max(MIN_WEIGHT);
    }

    /// Replaces the configured peer list.
    ///
    /// When the list differs from the current one, evictions are forgotten and the table is
    /// rebuilt from the new list. An identical list is a no-op.
    pub fn sync_with_config(&self, config: PeerConfig) {
        let mut table = self.table.lock();
        if table.config == config {
            return;
        }
        info!(
            target: "peers",
            peers = config.peers.len(),
            bootstrap = config.bootstrap.len(),
            "Peer configuration changed"
        );
        table.config = config;
        table.evicted.clear();
        table.rebuild();
    }

    /// Returns the current weight table.
    pub fn snapshot(&self) -> Vec<PeerWeight> {
        self.table.lock().peers.clone()
    }

    /// Returns the number of peers currently evicted.
    pub fn evicted(&self) -> usize {
        self.table.lock().evicted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn selector(peers: &[&str], bootstrap: &[&str]) -> PeerSelector {
        PeerSelector::new(PeerConfig::new(
            peers.iter().map(|p| url(p)).collect(),
            bootstrap.iter().map(|p| url(p)).collect(),
        ))
    }

    #[test]
    fn test_initial_weights() {
        let selector = selector(&["http://a", "http://b"], &["http://c"]);
        selector.select().unwrap();
        let snapshot = selector.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0], PeerWeight { url: url("http://c"), weight: BOOTSTRAP_WEIGHT });
        assert_eq!(snapshot[1].weight, DEFAULT_WEIGHT);
    }

    #[test]
    fn test_dead_peer_is_evicted_then_no_peers() {
        let selector = selector(&["http://dead:1984"], &[]);
        let peer = selector.select().unwrap();
        selector.report_failure(&peer, true);
        assert!(selector.snapshot().is_empty());
        assert_eq!(selector.evicted(), 1);
        assert_eq!(selector.select(), Err(PeerError::NoPeers));
    }

    #[test]
    fn test_soft_failure_never_evicts() {
        let selector = selector(&["http://a"], &[]);
        let peer = selector.select().unwrap();
        for _ in 0..10 {
            selector.report_failure(&peer, false);
        }
        assert_eq!(selector.snapshot()[0].weight, MIN_WEIGHT);
        assert!(selector.select().is_ok());
    }

    #[test]
    fn test_severe_failure_above_threshold_only_decrements() {
        let selector = selector(&[], &["http://boot"]);
        let peer = selector.select().unwrap();
        selector.report_failure(&peer, true);
        assert_eq!(selector.snapshot()[0].weight, BOOTSTRAP_WEIGHT - 1);
    }

    #[test]
    fn test_no_configuration_is_fatal() {
        let selector = PeerSelector::default();
        assert_eq!(selector.select(), Err(PeerError::NoPeers));
    }

    #[rstest]
    #[case::same_list(false)]
    #[case::changed_list(true)]
    fn test_sync_with_config(#[case] changed: bool) {
        let selector = selector(&["http://a"], &[]);
        let peer = selector.select().unwrap();
        selector.report_failure(&peer, true);
        let mut peers = vec![url("http://a")];
        if changed {
            peers.push(url("http://b"));
        }
        selector.sync_with_config(PeerConfig::new(peers, vec![]));
        assert_eq!(selector.select().is_ok(), changed);
        assert_eq!(selector.snapshot().len(), if changed { 2 } else { 0 });
    }

    #[test]
    fn test_selection_prefers_heavier_peers() {
        let selector = selector(&["http://light"], &["http://heavy"]);
        let heavy = url("http://heavy");
        selector.select().unwrap();
        for _ in 0..200 {
            selector.report_success(&heavy);
        }
        let picks = (0..1_000).filter(|_| selector.select().unwrap() == heavy).count();
        assert!(picks > 900, "heavy peer picked {picks} times");
    }

    proptest! {
        #[test]
        fn prop_weights_stay_in_bounds(events in proptest::collection::vec((any::<bool>(), any::<bool>()), 0..500)) {
            let selector = selector(&["http://a", "http://b"], &["http://c"]);
            for (success, severe) in events {
                let Ok(peer) = selector.select() else { break };
                if success {
                    selector.report_success(&peer);
                } else {
                    selector.report_failure(&peer, severe);
                }
                for entry in selector.snapshot() {
                    prop_assert!((MIN_WEIGHT..=MAX_WEIGHT).contains(&entry.weight));
                }
            }
        }
    }
}
