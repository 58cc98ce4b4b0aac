//! Shared sync state and the status derived from it.

use derive_more::Display;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc};

/// The phase of the orchestrator.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Waiting for workers and the hash list.
    #[default]
    #[display("bootstrapping")]
    Bootstrapping,
    /// Importing missing heights.
    #[display("catching_up")]
    CatchingUp,
    /// Following the upstream head.
    #[display("polling")]
    Polling,
    /// Reconciling a fork; no new heights are imported.
    #[display("paused_for_fork_recovery")]
    PausedForForkRecovery,
    /// Shut down.
    #[display("stopped")]
    Stopped,
}

/// The state the orchestrator shares with the status server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncState {
    /// Identifies this run.
    pub session_id: String,
    /// The orchestrator phase.
    pub phase: SyncPhase,
    /// The highest imported height.
    pub gateway_height: u64,
    /// The upstream height.
    pub upstream_height: u64,
    /// Heights being fetched or written.
    pub in_flight: BTreeSet<u64>,
    /// Transactions of the blocks being written.
    pub txs_in_flight: u64,
    /// The hash of the block at `gateway_height`.
    pub top_hash: Option<String>,
}

/// Whether the gateway has imported anything yet.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Health {
    /// Nothing imported yet.
    #[display("BOOTING")]
    Booting,
    /// Serving.
    #[display("OK")]
    Ok,
}

/// The status reported to operators and load balancers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    /// [`Health::Booting`] while the gateway height is zero.
    pub status: Health,
    /// The highest imported height.
    pub gateway_height: u64,
    /// The upstream height.
    pub arweave_height: u64,
    /// Transactions of the blocks being written.
    pub txs_in_flight: u64,
    /// Blocks behind upstream.
    pub delta: u64,
}

impl From<&SyncState> for GatewayStatus {
    fn from(state: &SyncState) -> Self {
        Self {
            status: if state.gateway_height == 0 { Health::Booting } else { Health::Ok },
            gateway_height: state.gateway_height,
            arweave_height: state.upstream_height,
            txs_in_flight: state.txs_in_flight,
            delta: state.upstream_height.saturating_sub(state.gateway_height),
        }
    }
}

/// A cloneable handle on the [`SyncState`].
#[derive(Debug, Clone, Default)]
pub struct SyncStateHandle {
    inner: Arc<RwLock<SyncState>>,
}

impl SyncStateHandle {
    /// Creates the state of a new run.
    pub fn new(session_id: impl Into<String>) -> Self {
        let state = SyncState { session_id: session_id.into(), ..Default::default() };
        Self { inner: Arc::new(RwLock::new(state)) }
    }

    /// Creates the state of a new run with a random session id.
    pub fn random() -> Self {
        Self::new(format!("{:016x}", rand::random::<u64>()))
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> SyncState {
        self.inner.read().clone()
    }

    /// The current status.
    pub fn status(&self) -> GatewayStatus {
        GatewayStatus::from(&*self.inner.read())
    }

    /// The current phase.
    pub fn phase(&self) -> SyncPhase {
        self.inner.read().phase
    }

    /// Moves to `phase`.
    pub fn set_phase(&self, phase: SyncPhase) {
        let mut state = self.inner.write();
        if state.phase != phase {
            info!(target: "sync", from = %state.phase, to = %phase, "Phase change");
            state.phase = phase;
        }
    }

    /// Records the upstream height.
    pub fn set_upstream_height(&self, height: u64) {
        self.inner.write().upstream_height = height;
    }

    /// Records the stored top after a resume or a rollback.
    pub fn set_top(&self, height: u64, hash: Option<String>) {
        let mut state = self.inner.write();
        state.gateway_height = height;
        state.top_hash = hash;
    }

    /// Marks `height` as in flight.
    pub fn begin(&self, height: u64) {
        self.inner.write().in_flight.insert(height);
    }

    /// Accounts for the transactions of a block about to be written.
    pub fn writing(&self, txs: u64) {
        self.inner.write().txs_in_flight += txs;
    }

    /// Marks `height` as no longer in flight, releasing its `txs`. A block written at `hash`
    /// at or above the current top becomes the new top.
    pub fn finish(&self, height: u64, txs: u64, hash: Option<&str>) {
        let mut state = self.inner.write();
        state.in_flight.remove(&height);
        state.txs_in_flight = state.txs_in_flight.saturating_sub(txs);
        let Some(hash) = hash else { return };
        if state.top_hash.is_none() || height >= state.gateway_height {
            state.gateway_height = height;
            state.top_hash = Some(hash.to_string());
        }
    }

    /// The recorded top as `(height, hash)`.
    pub fn top(&self) -> Option<(u64, String)> {
        let state = self.inner.read();
        state.top_hash.clone().map(|hash| (state.gateway_height, hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_booting_until_a_block_lands() {
        let state = SyncStateHandle::new("s");
        state.set_upstream_height(10);
        let status = state.status();
        assert_eq!(status.status, Health::Booting);
        assert_eq!(status.delta, 10);

        state.begin(4);
        state.writing(3);
        assert_eq!(state.status().txs_in_flight, 3);
        state.finish(4, 3, Some("h4"));
        let status = state.status();
        assert_eq!((status.status, status.gateway_height, status.delta), (Health::Ok, 4, 6));
        assert_eq!(status.txs_in_flight, 0);
        assert!(state.snapshot().in_flight.is_empty());
    }

    #[test]
    fn test_out_of_order_landing_keeps_the_highest_top() {
        let state = SyncStateHandle::new("s");
        state.finish(5, 0, Some("h5"));
        state.finish(3, 0, Some("h3"));
        assert_eq!(state.top(), Some((5, "h5".to_string())));
        state.finish(6, 0, None);
        assert_eq!(state.top(), Some((5, "h5".to_string())));
    }

    #[test]
    fn test_delta_never_underflows() {
        let state = SyncStateHandle::new("s");
        state.set_top(12, Some("h".into()));
        state.set_upstream_height(10);
        assert_eq!(state.status().delta, 0);
    }

    #[test]
    fn test_status_wire_format() {
        let status = GatewayStatus {
            status: Health::Ok,
            gateway_height: 2,
            arweave_height: 3,
            txs_in_flight: 0,
            delta: 1,
        };
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            r#"{"status":"OK","gatewayHeight":2,"arweaveHeight":3,"txsInFlight":0,"delta":1}"#
        );
    }
}
