//! The on-disk hash list cache.

use crate::SyncError;
use std::path::{Path, PathBuf};
use weave_sources::UpstreamClient;

/// Refreshes extend the cached list block by block when upstream is at most this far ahead.
pub const MAX_EXTENSION: u64 = 2_000;

/// The authoritative hash list, indexed by height, cached at `<data_dir>/<keyspace>/hash_list.json`.
///
/// Upstream serves tens of millions of hashes, so the list is fetched in full only on first run
/// or when the cached copy can no longer be extended.
#[derive(Debug, Clone)]
pub struct HashListCache {
    path: PathBuf,
    cap: Option<u64>,
}

impl HashListCache {
    /// The cache file name.
    pub const FILE_NAME: &str = "hash_list.json";

    /// A cache for `keyspace` under `data_dir`.
    pub fn new(data_dir: &Path, keyspace: &str) -> Self {
        Self { path: data_dir.join(keyspace).join(Self::FILE_NAME), cap: None }
    }

    /// Truncates every list returned to its first `cap` heights.
    pub const fn with_cap(mut self, cap: Option<u64>) -> Self {
        self.cap = cap;
        self
    }

    /// The cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached list, `None` if there is none.
    pub async fn load(&self) -> Result<Option<Vec<String>>, SyncError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.error(err)),
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|err| self.error(err))
    }

    /// Writes `hashes` to the cache.
    pub async fn save(&self, hashes: &[String]) -> Result<(), SyncError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|err| self.error(err))?;
        }
        let bytes = serde_json::to_vec(hashes).map_err(|err| self.error(err))?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes).await.map_err(|err| self.error(err))?;
        tokio::fs::rename(&staging, &self.path).await.map_err(|err| self.error(err))?;
        Ok(())
    }

    /// Returns the current hash list and updates the cache.
    ///
    /// The cached list is extended by fetching the missing blocks by height when its tip is still
    /// canonical and upstream is at most [`MAX_EXTENSION`] blocks ahead. Otherwise the full list
    /// is fetched.
    pub async fn refresh<U: UpstreamClient + ?Sized>(
        &self,
        upstream: &U,
    ) -> Result<Vec<String>, SyncError> {
        let cached = self.load().await?.unwrap_or_default();
        let mut hashes = match self.extend(upstream, cached).await? {
            Some(hashes) => hashes,
            None => {
                info!(target: "sync", "Fetching the full hash list");
                let hashes = upstream.fetch_hash_list().await?;
                self.save(&hashes).await?;
                hashes
            }
        };
        if let Some(cap) = self.cap {
            hashes.truncate(usize::try_from(cap).unwrap_or(usize::MAX));
        }
        info!(target: "sync", len = hashes.len(), "Hash list ready");
        Ok(hashes)
    }

    async fn extend<U: UpstreamClient + ?Sized>(
        &self,
        upstream: &U,
        mut hashes: Vec<String>,
    ) -> Result<Option<Vec<String>>, SyncError> {
        let Some(tip_hash) = hashes.last().cloned() else {
            return Ok(None);
        };
        let tip = hashes.len() as u64 - 1;
        let info = upstream.fetch_info().await?;
        if info.height < tip || info.height - tip > MAX_EXTENSION {
            debug!(target: "sync", cached = tip, upstream = info.height, "Cached hash list out of reach");
            return Ok(None);
        }
        if upstream.fetch_block_by_height(tip).await?.indep_hash != tip_hash {
            debug!(target: "sync", height = tip, "Cached hash list tip is no longer canonical");
            return Ok(None);
        }

        for height in tip + 1..=info.height {
            let block = upstream.fetch_block_by_height(height).await?;
            if block.previous_block != hashes[hashes.len() - 1] {
                debug!(target: "sync", height, "Upstream moved while extending the hash list");
                return Ok(None);
            }
            hashes.push(block.indep_hash);
        }
        if info.height > tip {
            self.save(&hashes).await?;
            debug!(target: "sync", from = tip + 1, to = info.height, "Extended cached hash list");
        }
        Ok(Some(hashes))
    }

    fn error(&self, err: impl std::fmt::Display) -> SyncError {
        SyncError::HashListCache { path: self.path.clone(), reason: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use weave_sources::TestUpstream;

    #[tokio::test]
    async fn test_first_refresh_fetches_and_caches() {
        let dir = TempDir::new().unwrap();
        let cache = HashListCache::new(dir.path(), "gateway");
        assert_eq!(cache.load().await.unwrap(), None);

        let upstream = TestUpstream::with_chain(3, 0);
        let hashes = cache.refresh(&upstream).await.unwrap();
        assert_eq!(hashes, vec!["main-0", "main-1", "main-2"]);
        assert_eq!(cache.load().await.unwrap(), Some(hashes));
        assert!(cache.path().ends_with("gateway/hash_list.json"));
    }

    #[tokio::test]
    async fn test_refresh_extends_a_canonical_cache() {
        let dir = TempDir::new().unwrap();
        let cache = HashListCache::new(dir.path(), "gateway");
        let upstream = TestUpstream::with_chain(5, 0);
        cache.save(&upstream.hash_list()[..3]).await.unwrap();

        let fetches = upstream.block_fetches();
        let hashes = cache.refresh(&upstream).await.unwrap();
        assert_eq!(hashes, upstream.hash_list());
        // The cached tip plus the two new blocks.
        assert_eq!(upstream.block_fetches() - fetches, 3);
    }

    #[tokio::test]
    async fn test_refresh_refetches_after_a_reorg() {
        let dir = TempDir::new().unwrap();
        let cache = HashListCache::new(dir.path(), "gateway");
        let upstream = TestUpstream::with_chain(5, 0);
        cache.save(&upstream.hash_list()).await.unwrap();

        upstream.reorg(2, 5, "fork");
        let hashes = cache.refresh(&upstream).await.unwrap();
        assert_eq!(hashes[2], "main-2");
        assert_eq!(hashes[3], "fork-3");
        assert_eq!(hashes.len(), 6);
    }

    #[tokio::test]
    async fn test_cap_truncates() {
        let dir = TempDir::new().unwrap();
        let cache = HashListCache::new(dir.path(), "gateway").with_cap(Some(2));
        let hashes = cache.refresh(&TestUpstream::with_chain(5, 0)).await.unwrap();
        assert_eq!(hashes, vec!["main-0", "main-1"]);
        assert_eq!(cache.load().await.unwrap().unwrap().len(), 5);
    }
}
