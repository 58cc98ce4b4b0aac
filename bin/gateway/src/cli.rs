//! Contains the gateway CLI.

use crate::{
    commands::{DoctorCommand, SyncCommand, WorkerCommand},
    flags::GlobalArgs,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use weave_cli::{cli_styles, init_tracing_subscriber};

/// Subcommands for the CLI.
#[derive(Debug, Clone, Subcommand)]
#[allow(clippy::large_enum_variant)]
pub enum Commands {
    /// Imports the weave and follows the upstream head.
    #[command(alias = "s")]
    Sync(SyncCommand),
    /// Serves tasks for a parent `sync` process over stdin and stdout.
    #[command(hide = true)]
    Worker(WorkerCommand),
    /// Reports heights missing from the store.
    #[command(alias = "d")]
    Doctor(DoctorCommand),
}

/// The gateway CLI.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, styles = cli_styles(), long_about = None)]
pub struct Cli {
    /// Global arguments for the CLI.
    #[command(flatten)]
    pub global: GlobalArgs,
    /// The subcommand to run.
    #[command(subcommand)]
    pub subcommand: Commands,
}

impl Cli {
    /// Runs the CLI.
    pub fn run(self) -> Result<()> {
        match self.subcommand {
            // Workers forward their logs to the parent and keep stdout for the protocol.
            Commands::Worker(worker) => Self::run_until_ctrl_c(worker.run(self.global)),
            Commands::Sync(sync) => {
                Self::init_stack(&self.global)?;
                Self::run_until_ctrl_c(sync.run(self.global))
            }
            Commands::Doctor(doctor) => {
                Self::init_stack(&self.global)?;
                Self::run_until_ctrl_c(doctor.run(self.global))
            }
        }
    }

    /// Initializes the tracing subscriber, the Prometheus exporter and the metric descriptions.
    pub fn init_stack(global: &GlobalArgs) -> Result<()> {
        init_tracing_subscriber(global.log_args.level, None::<EnvFilter>)?;

        if global.metrics.init_metrics()?.is_some() {
            weave_peers::Metrics::init();
            weave_sources::Metrics::init();
            weave_storage::Metrics::init();
            weave_sync::Metrics::init();
            weave_rpc::Metrics::init();
        }
        Ok(())
    }

    /// Runs the future to completion on a fresh multi-threaded runtime.
    pub fn run_until_ctrl_c<F>(fut: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        let rt = Self::tokio_runtime().map_err(|e| anyhow::anyhow!(e))?;
        rt.block_on(fut)
    }

    /// Creates a new default tokio multi-thread [Runtime](tokio::runtime::Runtime) with all
    /// features enabled.
    pub fn tokio_runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
        tokio::runtime::Builder::new_multi_thread().enable_all().build()
    }
}
