//! Storage flags.

use clap::{Args, ValueEnum};
use std::{path::PathBuf, sync::Arc};
use weave_storage::{GatewayStore, ManifestDetector, MemoryStore, WideColumnStore};
use weave_sync::HashListCache;

/// The storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// An in-memory store, lost on exit.
    #[default]
    Memory,
    /// A RocksDB database under the data directory.
    Rocksdb,
}

/// Where indexed data lives.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct StoreArgs {
    /// The store namespace.
    #[arg(long = "store.keyspace", env = "KEYSPACE", default_value = "gateway")]
    pub keyspace: String,
    /// Directory of the hash list cache and the RocksDB database.
    #[arg(long = "store.data-dir", env = "GATEWAY_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,
    /// The storage backend.
    #[arg(long = "store.backend", env = "STORE_BACKEND", value_enum, default_value_t = StoreBackend::Memory)]
    pub backend: StoreBackend,
}

impl StoreArgs {
    /// Opens the store and creates its tables.
    pub async fn open(&self) -> anyhow::Result<GatewayStore> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        let backend: Arc<dyn WideColumnStore> = match self.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Rocksdb => open_rocksdb(self.data_dir.join(format!("{}.rocksdb", self.keyspace)))?,
        };
        let store = GatewayStore::new(backend).with_processor(Arc::new(ManifestDetector));
        store.init().await?;
        info!(target: "storage", backend = ?self.backend, keyspace = %self.keyspace, "Opened store");
        Ok(store)
    }

    /// The on-disk hash list cache of this keyspace.
    pub fn hash_list_cache(&self) -> HashListCache {
        HashListCache::new(&self.data_dir, &self.keyspace)
    }
}

#[cfg(feature = "rocksdb")]
fn open_rocksdb(path: PathBuf) -> anyhow::Result<Arc<dyn WideColumnStore>> {
    Ok(Arc::new(weave_storage::RocksStore::open(path)?))
}

#[cfg(not(feature = "rocksdb"))]
fn open_rocksdb(_: PathBuf) -> anyhow::Result<Arc<dyn WideColumnStore>> {
    anyhow::bail!("the rocksdb backend requires building with the `rocksdb` feature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        store: StoreArgs,
    }

    #[test]
    fn test_backend_flag() {
        let cli = TestCli::parse_from(["test", "--store.backend", "rocksdb", "--store.keyspace", "k"]);
        assert_eq!(cli.store.backend, StoreBackend::Rocksdb);
        assert_eq!(cli.store.keyspace, "k");
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let args = StoreArgs {
            keyspace: "gateway".into(),
            data_dir: dir.path().join("data"),
            backend: StoreBackend::Memory,
        };
        let store = args.open().await.unwrap();
        assert!(store.is_empty().await.unwrap());
        assert!(args.data_dir.is_dir());
    }
}
