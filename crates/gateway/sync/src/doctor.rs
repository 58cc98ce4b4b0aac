//! Finds missing heights and repairs forks.

use crate::{DoctorError, Metrics};
use std::{collections::BTreeSet, fmt, sync::Arc};
use weave_protocol::Block;
use weave_sources::UpstreamClient;
use weave_storage::GatewayStore;

/// Heights scanned per localization step.
pub const SCAN_CHUNK: u64 = 1_000_000;

/// The outcome of the cheap gap check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapCheck {
    /// The number of heights the hash list has.
    pub expected: u64,
    /// The highest indexed height.
    pub stored_top: Option<u64>,
    /// Whether the store may be missing heights below `expected`.
    pub maybe_missing: bool,
}

/// The outcome of [`Doctor::resolve_fork`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkResolution {
    /// The highest height shared by the store and upstream.
    pub fork_point: u64,
    /// The blocks removed from the store, highest first.
    pub rolled_back: Vec<Block>,
    /// The upstream blocks above the fork point, ascending up to the head.
    pub new_chain: Vec<Block>,
}

/// Compares the store against upstream.
///
/// The doctor only ever reads the height index: a block counts as stored once its index entry is
/// written, which happens after every other row of the block.
#[derive(Clone)]
pub struct Doctor {
    store: GatewayStore,
    upstream: Arc<dyn UpstreamClient>,
}

impl fmt::Debug for Doctor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Doctor").field("store", &self.store).finish_non_exhaustive()
    }
}

impl Doctor {
    /// Creates a doctor for `store`, fetching ancestors from `upstream`.
    pub fn new(store: GatewayStore, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { store, upstream }
    }

    /// Flags a store whose top is below the hash list tip.
    pub async fn gap_check(&self, expected: u64) -> Result<GapCheck, DoctorError> {
        let stored_top = self.store.max_height().await?;
        let maybe_missing = stored_top.map_or(expected > 0, |top| top + 1 < expected);
        if maybe_missing {
            debug!(target: "doctor", expected, ?stored_top, "Store may be missing blocks");
        }
        Ok(GapCheck { expected, stored_top, maybe_missing })
    }

    /// Every height below `expected` missing from the store, ascending.
    pub async fn find_missing_blocks(&self, expected: u64) -> Result<Vec<u64>, DoctorError> {
        let mut missing = Vec::new();
        let mut start = 0;
        while start < expected {
            let end = expected.min(start.saturating_add(SCAN_CHUNK)) - 1;
            let present: BTreeSet<u64> =
                self.store.heights_in_range(start, end).await?.into_iter().collect();
            missing.extend((start..=end).filter(|height| !present.contains(height)));
            trace!(target: "doctor", start, end, present = present.len(), "Scanned chunk");
            start = end + 1;
        }
        weave_macros::set!(gauge, Metrics::MISSING_BLOCKS, missing.len() as f64);
        if !missing.is_empty() {
            info!(
                target: "doctor",
                count = missing.len(),
                first = missing[0],
                last = missing[missing.len() - 1],
                "Found missing blocks"
            );
        }
        Ok(missing)
    }

    /// Reconciles the store with an upstream `head`.
    ///
    /// Walks back from `head` through upstream ancestry until it meets a block the store has
    /// indexed under the same hash: the fork point. Every stored block above the fork point is
    /// rolled back and its transactions purged. If `head` itself is stored there is nothing to
    /// do, even when the store is ahead of it; if it merely extends the stored chain nothing is
    /// rolled back.
    pub async fn resolve_fork(&self, head: Block) -> Result<ForkResolution, DoctorError> {
        let mut new_chain = Vec::new();
        let mut cursor = head;
        let fork_point = loop {
            if self.is_stored(&cursor).await? {
                break cursor.height;
            }
            if cursor.is_genesis() {
                return Err(DoctorError::NoCommonAncestor {
                    head: new_chain.first().unwrap_or(&cursor).indep_hash.clone(),
                });
            }
            let parent = self.upstream.fetch_block_by_hash(&cursor.previous_block).await?;
            if parent.height + 1 != cursor.height {
                return Err(DoctorError::BrokenAncestry {
                    hash: parent.indep_hash,
                    height: parent.height,
                    child_height: cursor.height,
                });
            }
            trace!(target: "doctor", height = parent.height, hash = %parent.indep_hash, "Walked to ancestor");
            new_chain.push(cursor);
            cursor = parent;
        };
        if new_chain.is_empty() {
            debug!(target: "doctor", height = fork_point, "Head is already stored");
            return Ok(ForkResolution { fork_point, rolled_back: Vec::new(), new_chain });
        }
        new_chain.reverse();

        let stored_top = self.store.max_height().await?.unwrap_or(fork_point);
        let mut rolled_back = Vec::new();
        for height in (fork_point + 1..=stored_top).rev() {
            if let Some(block) = self.store.rollback_block(height).await? {
                self.store.purge_block_transactions(&block).await?;
                rolled_back.push(block);
            }
        }

        if !rolled_back.is_empty() {
            weave_macros::inc!(counter, Metrics::FORKS_RESOLVED);
            warn!(
                target: "doctor",
                fork_point,
                rolled_back = rolled_back.len(),
                new_blocks = new_chain.len(),
                "Resolved fork"
            );
        }
        Ok(ForkResolution { fork_point, rolled_back, new_chain })
    }

    async fn is_stored(&self, block: &Block) -> Result<bool, DoctorError> {
        Ok(self.store.block_hash_at(block.height).await?.as_deref() == Some(block.indep_hash.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use weave_sources::TestUpstream;
    use weave_storage::MemoryStore;

    async fn doctor(upstream: &TestUpstream) -> Doctor {
        let store = GatewayStore::new(Arc::new(MemoryStore::new()));
        store.init().await.unwrap();
        Doctor::new(store, Arc::new(upstream.clone()))
    }

    async fn store_chain(doctor: &Doctor, upstream: &TestUpstream, heights: impl Iterator<Item = u64>) {
        for height in heights {
            doctor.store.import_block(&upstream.block_at(height).unwrap()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_gap_check() {
        let upstream = TestUpstream::with_chain(3, 0);
        let doctor = doctor(&upstream).await;
        assert!(doctor.gap_check(3).await.unwrap().maybe_missing);
        assert!(!doctor.gap_check(0).await.unwrap().maybe_missing);
        store_chain(&doctor, &upstream, 0..3).await;
        let check = doctor.gap_check(3).await.unwrap();
        assert_eq!(check.stored_top, Some(2));
        assert!(!check.maybe_missing);
    }

    #[tokio::test]
    async fn test_missing_blocks_on_empty_store() {
        let upstream = TestUpstream::with_chain(3, 0);
        let doctor = doctor(&upstream).await;
        assert_eq!(doctor.find_missing_blocks(3).await.unwrap(), vec![0, 1, 2]);
        store_chain(&doctor, &upstream, 0..3).await;
        assert!(doctor.find_missing_blocks(3).await.unwrap().is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_missing_blocks_are_the_complement(stored in prop::collection::btree_set(0u64..2_500, 0..64)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let missing = runtime.block_on(async {
                let upstream = TestUpstream::default();
                let doctor = doctor(&upstream).await;
                for &height in &stored {
                    let block = Block { indep_hash: format!("h{height}"), height, ..Default::default() };
                    doctor.store.import_block(&block).await.unwrap();
                }
                doctor.find_missing_blocks(2_500).await.unwrap()
            });
            let expected: Vec<u64> = (0..2_500).filter(|h| !stored.contains(h)).collect();
            prop_assert_eq!(missing, expected);
        }
    }

    #[tokio::test]
    async fn test_fork_point_and_rollback() {
        let upstream = TestUpstream::with_chain(11, 1);
        let doctor = doctor(&upstream).await;
        store_chain(&doctor, &upstream, 0..11).await;

        upstream.reorg(9, 11, "fork");
        let head = upstream.tip().unwrap();
        let resolution = doctor.resolve_fork(head).await.unwrap();
        assert_eq!(resolution.fork_point, 9);
        let rolled: Vec<_> = resolution.rolled_back.iter().map(|b| b.height).collect();
        assert_eq!(rolled, vec![10]);
        let new: Vec<_> = resolution.new_chain.iter().map(|b| b.indep_hash.as_str()).collect();
        assert_eq!(new, vec!["fork-10", "fork-11"]);

        assert_eq!(doctor.store.max_height().await.unwrap(), Some(9));
        assert_eq!(doctor.store.block_hash_at(9).await.unwrap().as_deref(), Some("main-9"));
    }

    #[tokio::test]
    async fn test_extension_rolls_nothing_back() {
        let upstream = TestUpstream::with_chain(5, 0);
        let doctor = doctor(&upstream).await;
        store_chain(&doctor, &upstream, 0..3).await;

        let resolution = doctor.resolve_fork(upstream.tip().unwrap()).await.unwrap();
        assert_eq!(resolution.fork_point, 2);
        assert!(resolution.rolled_back.is_empty());
        assert_eq!(resolution.new_chain.len(), 2);

        let stored = doctor.resolve_fork(upstream.block_at(1).unwrap()).await.unwrap();
        assert_eq!(stored.fork_point, 1);
        assert!(stored.new_chain.is_empty());
        assert!(stored.rolled_back.is_empty());
        assert_eq!(doctor.store.max_height().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_unrelated_chain_has_no_common_ancestor() {
        let upstream = TestUpstream::with_chain(3, 0);
        let doctor = doctor(&upstream).await;
        let stranger = Block { indep_hash: "x-0".into(), height: 0, ..Default::default() };
        doctor.store.import_block(&stranger).await.unwrap();
        let err = doctor.resolve_fork(upstream.tip().unwrap()).await.unwrap_err();
        assert!(matches!(err, DoctorError::NoCommonAncestor { .. }));
    }
}
