//! Metrics for the peer selector.

/// Container for the metric names recorded by this crate.
#[derive(Debug, Clone, Copy)]
pub struct Metrics;

impl Metrics {
    /// Counter of evicted peers.
    pub const PEERS_EVICTED: &str = "weave_peers_evicted";

    /// Gauge of peers currently in the weight table.
    pub const ACTIVE_PEERS: &str = "weave_peers_active";

    /// Counter of reported failures, labelled by severity.
    pub const PEER_FAILURES: &str = "weave_peers_failures";

    /// Initializes metrics for the peer selector.
    ///
    /// This does two things:
    /// * Describes the metrics.
    /// * Zeroes the counters so they are exported before the first event.
    #[cfg(feature = "metrics")]
    pub fn init() {
        metrics::describe_counter!(Self::PEERS_EVICTED, "Peers evicted from the weight table");
        metrics::describe_gauge!(Self::ACTIVE_PEERS, "Peers in the weight table");
        metrics::describe_counter!(Self::PEER_FAILURES, "Failures reported against peers");
        metrics::counter!(Self::PEERS_EVICTED).absolute(0);
    }
}
