//! Metrics for the upstream fetchers.

/// Container for the metric names recorded by this crate.
#[derive(Debug, Clone, Copy)]
pub struct Metrics;

impl Metrics {
    /// Counter of upstream requests, labelled by outcome.
    pub const REQUESTS: &str = "weave_sources_requests";

    /// Counter of fetches that exhausted their retries, labelled by resource.
    pub const EXHAUSTED: &str = "weave_sources_exhausted";

    /// Initializes metrics for the fetchers.
    #[cfg(feature = "metrics")]
    pub fn init() {
        metrics::describe_counter!(Self::REQUESTS, "Requests sent to upstream peers");
        metrics::describe_counter!(Self::EXHAUSTED, "Fetches that ran out of attempts");
    }
}
