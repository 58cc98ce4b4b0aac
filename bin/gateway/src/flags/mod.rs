//! CLI flags.

mod globals;
pub use globals::GlobalArgs;

mod store;
pub use store::{StoreArgs, StoreBackend};

mod upstream;
pub use upstream::UpstreamArgs;

mod workers;
pub use workers::{WorkerArgs, WorkerMode};
