#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod error;
pub use error::WorkerError;

mod message;
pub use message::{
    LogLevel, LogRecord, ParentMessage, PoolEvent, StatRecord, TaskFailure, WorkerMessage,
};

mod handler;
pub use handler::{TaskHandler, WorkerContext};

mod log;
pub use log::ForwardLayer;

mod runtime;
pub use runtime::{run_stdio_worker, serve};

mod spawner;
pub use spawner::{LocalSpawner, ProcessSpawner, Spawner, WorkerLink};

mod pool;
pub use pool::{DEFAULT_GRACE, PoolStatus, WorkerPool};
