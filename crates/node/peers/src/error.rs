//! Errors for the peer selector.

use thiserror::Error;

/// An error returned by the [`PeerSelector`](crate::PeerSelector).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    /// The weight table is empty and no configured peer is eligible to rebuild it.
    ///
    /// This is fatal: callers must stop instead of retrying.
    #[error("no peers available: every configured peer is evicted or none is configured")]
    NoPeers,
}
