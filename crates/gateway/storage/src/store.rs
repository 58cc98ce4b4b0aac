//! The gateway's view of the store: multi-table writes and the reads sync needs.

use crate::{
    Consistency, KeyPart, Metrics, Order, Row, Select, Statement, StoreError, TableSchema,
    TxPostProcessor, WideColumnStore,
    tables::{
        self, BLOCK, BLOCK_HEIGHT_TO_HASH, BLOCK_POA, BlockPoaRecord, BlockRecord,
        GatewayStatusRecord, GqlProjection, HeightSortedRecord, HeightToHashRecord, MANIFEST_QUEUE,
        ManifestQueueRecord, ManifestRecord, ManifestState, Record, TX_OFFSET, TransactionRecord,
        TxIdSortedRecord, TxOffsetRecord, TxTagRecord,
    },
};
use futures::future::try_join_all;
use std::{fmt, sync::Arc, sync::LazyLock};
use weave_protocol::{Block, Bucketing, PathManifest, Transaction, TxOffset};

/// Bulk import rows.
const IMPORT: Consistency = Consistency::One;
/// Height index, manifest queue and status rows.
const COORDINATION: Consistency = Consistency::Quorum;

static GQL_SCHEMAS: LazyLock<Vec<(GqlProjection, TableSchema)>> =
    LazyLock::new(|| GqlProjection::all().map(|p| (p, p.schema())).collect());

/// Fans block and transaction imports out to every table they touch, and answers the reads the
/// doctor and the orchestrator need.
///
/// There are no cross-row transactions. The writes of one import are issued concurrently and the
/// import succeeds only if all of them do. The height index row of a block is written last and
/// removed first, so a block that is only partly written or partly removed always reads as
/// missing.
#[derive(Clone)]
pub struct GatewayStore {
    store: Arc<dyn WideColumnStore>,
    processors: Vec<Arc<dyn TxPostProcessor>>,
}

impl fmt::Debug for GatewayStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayStore")
            .field("store", &self.store)
            .field("processors", &self.processors.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl GatewayStore {
    /// Wraps a backend.
    pub fn new(store: Arc<dyn WideColumnStore>) -> Self {
        Self { store, processors: Vec::new() }
    }

    /// Adds a post-processor run on every imported transaction.
    pub fn with_processor(mut self, processor: Arc<dyn TxPostProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// The backend.
    pub fn backend(&self) -> &Arc<dyn WideColumnStore> {
        &self.store
    }

    /// Creates every table.
    pub async fn init(&self) -> Result<(), StoreError> {
        let schemas = tables::schemas();
        for schema in &schemas {
            self.store.create_table(schema).await?;
        }
        debug!(target: "storage", tables = schemas.len(), "Created tables");
        Ok(())
    }

    async fn write_all(
        &self,
        statements: Vec<Statement>,
        consistency: Consistency,
    ) -> Result<usize, StoreError> {
        let count = statements.len();
        try_join_all(
            statements.into_iter().map(|statement| self.store.execute(statement, consistency)),
        )
        .await
        .inspect_err(|err| {
            weave_macros::inc!(counter, Metrics::WRITE_FAILURES);
            warn!(target: "storage", %err, "Write failed");
        })?;
        weave_macros::record!(histogram, Metrics::STATEMENTS_PER_IMPORT, count as f64);
        Ok(count)
    }

    /// Writes a transaction to its primary record, the id projections, the tag rows, every GQL
    /// projection its populated fields satisfy and, if it carries data, its offset.
    ///
    /// Post-processor statements are issued alongside.
    pub async fn import_transaction(
        &self,
        height: u64,
        tx_index: u64,
        tx: &Transaction,
        block: &Block,
        offset: Option<&TxOffset>,
    ) -> Result<(), StoreError> {
        let record = TransactionRecord {
            tx: tx.clone(),
            tx_index,
            block_height: height,
            block_hash: block.indep_hash.clone(),
        };
        let mut statements: Vec<_> = transaction_rows(&record)
            .map(|(table, row)| Statement::insert(table, row))
            .collect();
        if let Some(offset) = offset.filter(|_| tx.has_data()) {
            let offset = TxOffsetRecord { tx_id: tx.id.clone(), offset: *offset };
            statements.push(Statement::insert(TX_OFFSET, offset.to_row()));
        }
        let processed: Vec<_> =
            self.processors.iter().flat_map(|p| p.process(tx, height)).collect();

        let (rows, _) = futures::try_join!(
            self.write_all(statements, IMPORT),
            self.write_all(processed, COORDINATION),
        )?;
        trace!(target: "storage", tx = %tx.id, height, tx_index, rows, "Imported transaction");
        Ok(())
    }

    /// Writes the block level rows, then the height index entry.
    ///
    /// The index entry is a conditional insert: re-importing the same block is a no-op, while a
    /// different block already indexed at the height is a [`StoreError::HeightConflict`].
    pub async fn import_block(&self, block: &Block) -> Result<(), StoreError> {
        let sorted = HeightSortedRecord::for_block(block).to_row();
        let mut statements = vec![
            Statement::insert(BLOCK, BlockRecord(block.clone()).to_row()),
            Statement::insert(HeightSortedRecord::table(Order::Asc), sorted.clone()),
            Statement::insert(HeightSortedRecord::table(Order::Desc), sorted),
        ];
        if let Some(poa) = BlockPoaRecord::for_block(block) {
            statements.push(Statement::insert(BLOCK_POA, poa.to_row()));
        }
        self.write_all(statements, IMPORT).await?;

        let marker = HeightToHashRecord { height: block.height, hash: block.indep_hash.clone() };
        let applied = self
            .store
            .execute(
                Statement::insert_if_not_exists(BLOCK_HEIGHT_TO_HASH, marker.to_row()),
                COORDINATION,
            )
            .await?;
        if !applied {
            let stored = self.block_hash_at(block.height).await?.unwrap_or_default();
            if stored != block.indep_hash {
                return Err(StoreError::HeightConflict {
                    height: block.height,
                    stored,
                    incoming: block.indep_hash.clone(),
                });
            }
        }
        weave_macros::inc!(counter, Metrics::BLOCKS_WRITTEN);
        debug!(target: "storage", height = block.height, hash = %block.indep_hash, "Imported block");
        Ok(())
    }

    /// The highest indexed height, `None` if nothing is indexed.
    pub async fn max_height(&self) -> Result<Option<u64>, StoreError> {
        let partitions = self.store.partition_keys(BLOCK_HEIGHT_TO_HASH, COORDINATION).await?;
        for partition in partitions.into_iter().rev() {
            let select =
                Select::partition(BLOCK_HEIGHT_TO_HASH, partition).order(Order::Desc).limit(1);
            if let Some(row) = self.store.query(&select, COORDINATION).await?.first() {
                return Ok(Some(HeightToHashRecord::from_row(row)?.height));
            }
        }
        Ok(None)
    }

    /// Returns `true` if no block is indexed.
    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.max_height().await?.is_none())
    }

    /// The indexed heights in `[from, to]`, ascending.
    pub async fn heights_in_range(&self, from: u64, to: u64) -> Result<Vec<u64>, StoreError> {
        if from > to {
            return Ok(Vec::new());
        }
        let mut heights = Vec::new();
        for bucket in Bucketing::height_buckets(from, to) {
            let partition = vec![KeyPart::Long(bucket.partition_id), KeyPart::Long(bucket.bucket_id)];
            let select = Select::partition(BLOCK_HEIGHT_TO_HASH, partition)
                .range(from, to)
                .order(Order::Asc);
            for row in self.store.query(&select, COORDINATION).await? {
                heights.push(row.long("block_height")?);
            }
        }
        Ok(heights)
    }

    /// The hash indexed at `height`.
    pub async fn block_hash_at(&self, height: u64) -> Result<Option<String>, StoreError> {
        let select =
            Select::partition(BLOCK_HEIGHT_TO_HASH, HeightToHashRecord::partition(height))
                .key(height);
        let rows = self.store.query(&select, COORDINATION).await?;
        rows.first().map(|row| HeightToHashRecord::from_row(row).map(|r| r.hash)).transpose()
    }

    /// The height of the stored block with `hash`.
    pub async fn block_height_of(&self, hash: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.get_block(hash).await?.map(|block| block.height))
    }

    /// The stored block with `hash`, including its proof of access.
    pub async fn get_block(&self, hash: &str) -> Result<Option<Block>, StoreError> {
        let Some(row) = self.get_one(BLOCK, hash, IMPORT).await? else {
            return Ok(None);
        };
        let mut block = BlockRecord::from_row(&row)?.0;
        if let Some(poa) = self.get_one(BLOCK_POA, hash, IMPORT).await? {
            block.poa = Some(BlockPoaRecord::from_row(&poa)?.poa);
        }
        Ok(Some(block))
    }

    /// The stored transaction with `id`.
    pub async fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>, StoreError> {
        let row = self.get_one(tables::TRANSACTION, id, IMPORT).await?;
        row.as_ref().map(TransactionRecord::from_row).transpose()
    }

    /// The stored offset of the transaction with `id`.
    pub async fn get_tx_offset(&self, id: &str) -> Result<Option<TxOffset>, StoreError> {
        let row = self.get_one(TX_OFFSET, id, IMPORT).await?;
        row.as_ref().map(|row| TxOffsetRecord::from_row(row).map(|r| r.offset)).transpose()
    }

    async fn get_one(
        &self,
        table: &str,
        key: &str,
        consistency: Consistency,
    ) -> Result<Option<Row>, StoreError> {
        let select = Select::partition(table, vec![KeyPart::from(key)]).limit(1);
        Ok(self.store.query(&select, consistency).await?.into_iter().next())
    }

    /// Removes the block level rows of the block indexed at `height`, starting with the index
    /// entry. Returns the removed block, `None` if nothing was indexed there.
    pub async fn rollback_block(&self, height: u64) -> Result<Option<Block>, StoreError> {
        let Some(hash) = self.block_hash_at(height).await? else {
            return Ok(None);
        };
        let block = self.get_block(&hash).await?;

        let mut marker = HeightToHashRecord::partition(height);
        marker.push(KeyPart::Long(height));
        self.store.execute(Statement::delete(BLOCK_HEIGHT_TO_HASH, marker), COORDINATION).await?;

        let mut sorted = HeightToHashRecord::partition(height);
        sorted.push(KeyPart::Long(height));
        let statements = vec![
            Statement::delete(HeightSortedRecord::table(Order::Asc), sorted.clone()),
            Statement::delete(HeightSortedRecord::table(Order::Desc), sorted),
            Statement::delete(BLOCK_POA, vec![KeyPart::from(hash.as_str())]),
            Statement::delete(BLOCK, vec![KeyPart::from(hash.as_str())]),
        ];
        self.write_all(statements, IMPORT).await?;

        weave_macros::inc!(counter, Metrics::BLOCKS_ROLLED_BACK);
        info!(target: "storage", height, %hash, "Rolled back block");
        Ok(Some(block.unwrap_or_else(|| Block { indep_hash: hash, height, ..Default::default() })))
    }

    /// Removes the transaction level rows of a rolled back block.
    ///
    /// The rows are recomputed from the stored transaction records. Transactions since re-imported
    /// under another block are left alone. Failures are logged and skipped; returns the number of
    /// transactions purged.
    pub async fn purge_block_transactions(&self, block: &Block) -> Result<usize, StoreError> {
        let mut purged = 0;
        for id in &block.txs {
            let record = match self.get_transaction(id).await {
                Ok(Some(record)) if record.block_hash == block.indep_hash => record,
                Ok(_) => continue,
                Err(err) => {
                    warn!(target: "storage", tx = %id, %err, "Skipping unreadable transaction");
                    continue;
                }
            };
            let mut statements = vec![
                Statement::delete(TX_OFFSET, vec![KeyPart::from(id.as_str())]),
                Statement::delete(
                    MANIFEST_QUEUE,
                    [ManifestState::Pending.partition(), vec![KeyPart::from(id.as_str())]].concat(),
                ),
            ];
            for (table, row) in transaction_rows(&record) {
                match schema_of(&table).and_then(|schema| schema.primary_key(&row)) {
                    Ok(key) => statements.push(Statement::delete(table, key)),
                    Err(err) => warn!(target: "storage", %table, %err, "Cannot key row for purge"),
                }
            }
            match self.write_all(statements, IMPORT).await {
                Ok(_) => purged += 1,
                Err(err) => warn!(target: "storage", tx = %id, %err, "Failed to purge transaction"),
            }
        }
        info!(target: "storage", height = block.height, purged, "Purged rolled back transactions");
        Ok(purged)
    }

    /// Up to `limit` manifests waiting in the queue.
    pub async fn pending_manifests(
        &self,
        limit: usize,
    ) -> Result<Vec<ManifestQueueRecord>, StoreError> {
        self.manifest_queue(ManifestState::Pending, limit).await
    }

    /// Up to `limit` manifests that were given up on.
    pub async fn failed_manifests(
        &self,
        limit: usize,
    ) -> Result<Vec<ManifestQueueRecord>, StoreError> {
        self.manifest_queue(ManifestState::Failed, limit).await
    }

    async fn manifest_queue(
        &self,
        state: ManifestState,
        limit: usize,
    ) -> Result<Vec<ManifestQueueRecord>, StoreError> {
        let select = Select::partition(MANIFEST_QUEUE, state.partition()).limit(limit);
        let rows = self.store.query(&select, COORDINATION).await?;
        rows.iter().map(ManifestQueueRecord::from_row).collect()
    }

    /// Stores a resolved manifest and takes it off the queue.
    pub async fn save_manifest(
        &self,
        tx_id: &str,
        manifest: PathManifest,
    ) -> Result<(), StoreError> {
        let record = ManifestRecord { tx_id: tx_id.to_string(), manifest };
        self.store.execute(Statement::insert(tables::MANIFEST, record.to_row()), COORDINATION).await?;
        self.dequeue_manifest(ManifestState::Pending, tx_id).await
    }

    /// Records a failed resolution attempt. After `max_attempts` the entry moves to the failed
    /// partition and is never retried. Returns the entry's new state.
    pub async fn record_manifest_failure(
        &self,
        entry: &ManifestQueueRecord,
        reason: &str,
        max_attempts: u64,
    ) -> Result<ManifestState, StoreError> {
        let mut entry = entry.clone();
        entry.attempts += 1;
        entry.last_error = Some(reason.to_string());
        if entry.attempts < max_attempts {
            entry.state = ManifestState::Pending;
            self.store.execute(Statement::insert(MANIFEST_QUEUE, entry.to_row()), COORDINATION).await?;
            return Ok(ManifestState::Pending);
        }
        entry.state = ManifestState::Failed;
        self.store.execute(Statement::insert(MANIFEST_QUEUE, entry.to_row()), COORDINATION).await?;
        self.dequeue_manifest(ManifestState::Pending, &entry.tx_id).await?;
        warn!(target: "manifest", tx = %entry.tx_id, attempts = entry.attempts, reason, "Giving up on manifest");
        Ok(ManifestState::Failed)
    }

    async fn dequeue_manifest(&self, state: ManifestState, tx_id: &str) -> Result<(), StoreError> {
        let key = [state.partition(), vec![KeyPart::from(tx_id)]].concat();
        self.store.execute(Statement::delete(MANIFEST_QUEUE, key), COORDINATION).await?;
        Ok(())
    }

    /// The stored manifest of `tx_id`.
    pub async fn get_manifest(&self, tx_id: &str) -> Result<Option<ManifestRecord>, StoreError> {
        let row = self.get_one(tables::MANIFEST, tx_id, COORDINATION).await?;
        row.as_ref().map(ManifestRecord::from_row).transpose()
    }

    /// Persists the sync status row.
    pub async fn save_status(&self, status: &GatewayStatusRecord) -> Result<(), StoreError> {
        self.store
            .execute(Statement::insert(tables::GATEWAY_STATUS, status.to_row()), COORDINATION)
            .await?;
        Ok(())
    }

    /// The status row of `keyspace`.
    pub async fn load_status(
        &self,
        keyspace: &str,
    ) -> Result<Option<GatewayStatusRecord>, StoreError> {
        let row = self.get_one(tables::GATEWAY_STATUS, keyspace, COORDINATION).await?;
        row.as_ref().map(GatewayStatusRecord::from_row).transpose()
    }
}

/// Every `(table, row)` a transaction writes, except its offset.
fn transaction_rows(record: &TransactionRecord) -> impl Iterator<Item = (String, Row)> + '_ {
    let tx = &record.tx;
    let index = record.tx_index;
    let sorted = TxIdSortedRecord { tx_index: index, tx_id: tx.id.clone() }.to_row();
    let fixed = [
        (tables::TRANSACTION.to_string(), record.to_row()),
        (TxIdSortedRecord::table(Order::Asc).to_string(), sorted.clone()),
        (TxIdSortedRecord::table(Order::Desc).to_string(), sorted),
    ];
    let tags = TxTagRecord::for_transaction(tx, index)
        .into_iter()
        .map(|tag| (tables::TX_TAG.to_string(), tag.to_row()));
    let projections = GQL_SCHEMAS.iter().flat_map(move |(projection, schema)| {
        projection
            .rows(tx, index, record.block_height)
            .into_iter()
            .map(|row| (schema.name.clone(), row))
    });
    fixed.into_iter().chain(tags).chain(projections)
}

fn schema_of(table: &str) -> Result<TableSchema, StoreError> {
    if let Some((_, schema)) = GQL_SCHEMAS.iter().find(|(_, schema)| schema.name == table) {
        return Ok(schema.clone());
    }
    match table {
        tables::TRANSACTION => Ok(TransactionRecord::schema()),
        tables::TX_ID_SORTED_ASC => Ok(TxIdSortedRecord::schema_for(Order::Asc)),
        tables::TX_ID_SORTED_DESC => Ok(TxIdSortedRecord::schema_for(Order::Desc)),
        tables::TX_TAG => Ok(TxTagRecord::schema()),
        _ => Err(StoreError::UnknownTable(table.to_string())),
    }
}
