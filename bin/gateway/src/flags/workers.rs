//! Worker pool flags.

use crate::flags::UpstreamArgs;
use clap::{Args, ValueEnum};
use std::ffi::OsString;
use weave_sources::HttpUpstream;
use weave_sync::{ImportHandler, ImportPool, ImportRequest, ImportResponse};
use weave_workers::{LocalSpawner, ProcessSpawner, WorkerPool};

/// How workers are isolated from the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum WorkerMode {
    /// Each worker is a child process.
    #[default]
    Process,
    /// Each worker is a task inside this process.
    Local,
}

/// Worker pool sizes and isolation.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct WorkerArgs {
    /// Number of block import workers.
    #[arg(long = "workers.import", env = "PARALLEL_WORKERS", default_value_t = 4)]
    pub import: usize,
    /// Number of manifest workers. Zero disables manifest resolution.
    #[arg(long = "workers.manifest", env = "MANIFEST_WORKERS", default_value_t = 1)]
    pub manifest: usize,
    /// How workers are isolated.
    #[arg(long = "workers.mode", env = "WORKER_MODE", value_enum, default_value_t = WorkerMode::Process)]
    pub mode: WorkerMode,
}

impl WorkerArgs {
    /// Spawns a pool of `size` workers fetching from the given upstream.
    ///
    /// Process workers re-run this binary's `worker` command with the same upstream flags and
    /// verbosity.
    pub fn spawn(
        &self,
        size: usize,
        upstream: &HttpUpstream,
        upstream_args: &UpstreamArgs,
        verbosity: u8,
    ) -> anyhow::Result<ImportPool> {
        let pool = match self.mode {
            WorkerMode::Local => {
                WorkerPool::spawn(&LocalSpawner::new(ImportHandler::new(upstream.clone())), size)?
            }
            WorkerMode::Process => {
                let spawner = ProcessSpawner::<ImportRequest, ImportResponse>::current_exe(
                    worker_args(upstream_args, verbosity),
                )?;
                WorkerPool::spawn(&spawner, size)?
            }
        };
        Ok(pool)
    }
}

fn worker_args(upstream: &UpstreamArgs, verbosity: u8) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["worker".into()];
    args.extend(upstream.to_args());
    if verbosity > 0 {
        args.push(format!("-{}", "v".repeat(verbosity as usize)).into());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_args() {
        let upstream =
            UpstreamArgs { nodes: r#"["http://a"]"#.into(), bootstrap_nodes: None, http_timeout: 3 };
        let args = worker_args(&upstream, 2);
        assert_eq!(
            args,
            ["worker", "--arweave.nodes", r#"["http://a"]"#, "--http.timeout", "3", "-vv"]
                .map(OsString::from)
        );
        assert_eq!(worker_args(&upstream, 0).len(), 5);
    }
}
