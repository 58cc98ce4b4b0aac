//! Re-emits what happens inside worker pools.

use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use weave_sync::ImportPool;
use weave_workers::{LogLevel, LogRecord, PoolEvent};

/// Spawns a task that logs the events of `pool` under the `workers` target and records worker
/// statistics as histograms.
pub fn relay_pool_events(pool: &ImportPool, name: &'static str) -> JoinHandle<()> {
    let mut events = pool.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => emit(name, event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "workers", pool = name, skipped, "Dropped worker events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn emit(pool: &'static str, event: PoolEvent) {
    match event {
        PoolEvent::Log { worker, record: LogRecord { level, target, message } } => match level {
            LogLevel::Error => error!(target: "workers", pool, worker, source = %target, "{message}"),
            LogLevel::Warn => warn!(target: "workers", pool, worker, source = %target, "{message}"),
            LogLevel::Info => info!(target: "workers", pool, worker, source = %target, "{message}"),
            LogLevel::Debug => debug!(target: "workers", pool, worker, source = %target, "{message}"),
            LogLevel::Trace => trace!(target: "workers", pool, worker, source = %target, "{message}"),
        },
        PoolEvent::Stats { worker, record } => {
            trace!(target: "workers", pool, worker, stat = %record.name, value = record.value, "Worker stat");
            metrics::histogram!("weave_worker_stat", "pool" => pool, "stat" => record.name)
                .record(record.value);
        }
        PoolEvent::Exited { worker } => debug!(target: "workers", pool, worker, "Worker exited"),
    }
}
