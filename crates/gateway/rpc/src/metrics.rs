//! Metrics for the status server.

/// Container for the metric names recorded by this crate.
#[derive(Debug, Clone, Copy)]
pub struct Metrics;

impl Metrics {
    /// Counter of RPC calls, labelled by method.
    pub const RPC_CALLS: &str = "weave_rpc_calls";

    /// Initializes metrics for the status server.
    #[cfg(feature = "metrics")]
    pub fn init() {
        metrics::describe_counter!(Self::RPC_CALLS, "RPC calls served by method");
    }
}
