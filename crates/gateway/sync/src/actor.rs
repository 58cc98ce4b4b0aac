//! [SyncActor] trait.

use async_trait::async_trait;

/// A long-running task of the sync engine.
///
/// Actors are built with everything they need up front and then driven by [`SyncActor::start`]
/// until they finish or their cancellation token fires. The binary runs the orchestrator and the
/// manifest sweeper side by side as actors.
#[async_trait]
pub trait SyncActor: Send + 'static {
    /// The error type for the actor.
    type Error: std::fmt::Debug;
    /// The type necessary to pass to the start function.
    type StartData: Sized;

    /// Starts the actor.
    async fn start(self, start_context: Self::StartData) -> Result<(), Self::Error>;
}
