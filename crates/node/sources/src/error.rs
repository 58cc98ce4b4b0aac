//! Fetch errors.

use thiserror::Error;
use weave_peers::PeerError;
use weave_protocol::ChunkDecodeError;

/// An error fetching from upstream.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No peer could be selected.
    #[error(transparent)]
    Peers(#[from] PeerError),
    /// The request never produced a response: refused connection, timeout, reset.
    #[error("transport error from {peer}: {reason}")]
    Transport {
        /// The peer the request was sent to.
        peer: String,
        /// The underlying failure.
        reason: String,
    },
    /// The peer answered with a non-2xx status.
    #[error("{peer} answered {status} for /{path}")]
    Status {
        /// The peer the request was sent to.
        peer: String,
        /// The requested path.
        path: String,
        /// The response status.
        status: u16,
    },
    /// The response body could not be decoded.
    #[error("undecodable body from {peer} for /{path}: {reason}")]
    Decode {
        /// The peer the request was sent to.
        peer: String,
        /// The requested path.
        path: String,
        /// The decode failure.
        reason: String,
    },
    /// A request url could not be built.
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    /// The HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Client(String),
    /// A block fetched by height carries a different height.
    #[error("requested block {requested} but received block {received}")]
    HeightMismatch {
        /// The requested height.
        requested: u64,
        /// The height embedded in the response.
        received: u64,
    },
    /// Every attempt failed.
    #[error("{what} unavailable after {attempts} attempts")]
    Exhausted {
        /// What was being fetched.
        what: String,
        /// The number of attempts made.
        attempts: usize,
    },
    /// A chunk needed to assemble a payload is unavailable.
    #[error("chunk at offset {offset} of {id} is unavailable")]
    ChunkUnavailable {
        /// The transaction whose data was being assembled.
        id: String,
        /// The absolute offset of the missing chunk.
        offset: u64,
    },
    /// A chunk payload is not valid base64url.
    #[error(transparent)]
    Chunk(#[from] ChunkDecodeError),
}

impl FetchError {
    /// Returns `true` for failures that another attempt, possibly against another peer, may fix.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. } | Self::Decode { .. })
    }

    /// Returns `true` for failures the sync cannot proceed past.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Peers(_)
                | Self::Exhausted { .. }
                | Self::HeightMismatch { .. }
                | Self::InvalidUrl(_)
                | Self::Client(_)
        )
    }

    /// Returns `true` if the peer should be penalized severely for this failure.
    pub const fn is_severe(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::transport(FetchError::Transport { peer: "p".into(), reason: "refused".into() }, true, false)]
    #[case::status(FetchError::Status { peer: "p".into(), path: "info".into(), status: 503 }, true, false)]
    #[case::mismatch(FetchError::HeightMismatch { requested: 1, received: 2 }, false, true)]
    #[case::no_peers(FetchError::Peers(PeerError::NoPeers), false, true)]
    #[case::chunk(FetchError::ChunkUnavailable { id: "t".into(), offset: 3 }, false, false)]
    fn test_classification(#[case] err: FetchError, #[case] retryable: bool, #[case] fatal: bool) {
        assert_eq!(err.is_retryable(), retryable);
        assert_eq!(err.is_fatal(), fatal);
    }
}
