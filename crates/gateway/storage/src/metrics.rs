//! Metrics for the storage adapter.

/// Container for the metric names recorded by this crate.
#[derive(Debug, Clone, Copy)]
pub struct Metrics;

impl Metrics {
    /// Counter of blocks whose height index entry was written.
    pub const BLOCKS_WRITTEN: &str = "weave_storage_blocks_written";

    /// Counter of blocks removed by fork recovery.
    pub const BLOCKS_ROLLED_BACK: &str = "weave_storage_blocks_rolled_back";

    /// Counter of failed multi-row writes.
    pub const WRITE_FAILURES: &str = "weave_storage_write_failures";

    /// Histogram of statements issued per write batch.
    pub const STATEMENTS_PER_IMPORT: &str = "weave_storage_statements_per_import";

    /// Initializes metrics for the storage adapter.
    ///
    /// This does two things:
    /// * Describes the metrics.
    /// * Zeroes the counters so they are exported before the first event.
    #[cfg(feature = "metrics")]
    pub fn init() {
        metrics::describe_counter!(Self::BLOCKS_WRITTEN, "Blocks indexed by height");
        metrics::describe_counter!(Self::BLOCKS_ROLLED_BACK, "Blocks rolled back after a fork");
        metrics::describe_counter!(Self::WRITE_FAILURES, "Failed write batches");
        metrics::describe_histogram!(Self::STATEMENTS_PER_IMPORT, "Statements per write batch");
        metrics::counter!(Self::BLOCKS_WRITTEN).absolute(0);
        metrics::counter!(Self::BLOCKS_ROLLED_BACK).absolute(0);
        metrics::counter!(Self::WRITE_FAILURES).absolute(0);
    }
}
