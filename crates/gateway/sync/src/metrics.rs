//! Metrics for the sync engine.

/// Container for the metric names recorded by this crate.
#[derive(Debug, Clone, Copy)]
pub struct Metrics;

impl Metrics {
    /// Counter of blocks written.
    pub const BLOCKS_IMPORTED: &str = "weave_sync_blocks_imported";

    /// Counter of heights requeued, labelled by import code.
    pub const HEIGHTS_REQUEUED: &str = "weave_sync_heights_requeued";

    /// Gauge of the highest imported height.
    pub const GATEWAY_HEIGHT: &str = "weave_sync_gateway_height";

    /// Gauge of the upstream height.
    pub const UPSTREAM_HEIGHT: &str = "weave_sync_upstream_height";

    /// Gauge of the heights found missing by the last doctor pass.
    pub const MISSING_BLOCKS: &str = "weave_sync_missing_blocks";

    /// Counter of forks that rolled blocks back.
    pub const FORKS_RESOLVED: &str = "weave_sync_forks_resolved";

    /// Counter of manifests resolved, labelled by outcome.
    pub const MANIFESTS: &str = "weave_sync_manifests";

    /// Statistic reported by workers: transactions fetched for one block.
    pub const WORKER_TXS_FETCHED: &str = "txs_fetched";

    /// Initializes metrics for the sync engine.
    ///
    /// This does two things:
    /// * Describes the metrics.
    /// * Zeroes the counters so they are exported before the first event.
    #[cfg(feature = "metrics")]
    pub fn init() {
        metrics::describe_counter!(Self::BLOCKS_IMPORTED, "Blocks written to the store");
        metrics::describe_counter!(Self::HEIGHTS_REQUEUED, "Heights scheduled again");
        metrics::describe_gauge!(Self::GATEWAY_HEIGHT, "Highest imported height");
        metrics::describe_gauge!(Self::UPSTREAM_HEIGHT, "Upstream height");
        metrics::describe_gauge!(Self::MISSING_BLOCKS, "Heights missing after the last doctor pass");
        metrics::describe_counter!(Self::FORKS_RESOLVED, "Forks that rolled blocks back");
        metrics::describe_counter!(Self::MANIFESTS, "Manifests processed by outcome");
        metrics::counter!(Self::BLOCKS_IMPORTED).absolute(0);
        metrics::counter!(Self::FORKS_RESOLVED).absolute(0);
    }
}
