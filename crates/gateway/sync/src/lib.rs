#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod error;
pub use error::{DoctorError, SyncError};

mod task;
pub use task::{
    BlockImport, FetchedTransaction, ImportCode, ImportPool, ImportRequest, ImportResponse,
    ManifestOutcome, ManifestResult,
};

mod handler;
pub use handler::ImportHandler;

mod writer;
pub use writer::BlockWriter;

mod hash_list;
pub use hash_list::{HashListCache, MAX_EXTENSION};

mod doctor;
pub use doctor::{Doctor, ForkResolution, GapCheck, SCAN_CHUNK};

mod state;
pub use state::{GatewayStatus, Health, SyncPhase, SyncState, SyncStateHandle};

mod actor;
pub use actor::SyncActor;

mod orchestrator;
pub use orchestrator::{BatchReport, DEFAULT_POLL_INTERVAL, SyncConfig, SyncOrchestrator};

mod manifests;
pub use manifests::{ManifestSweeper, SweepReport, SweeperConfig};

mod metrics;
pub use metrics::Metrics;
