//! An in-memory [`WideColumnStore`].

use crate::{
    Consistency, KeyPart, Order, Row, Select, Statement, StoreError, TableSchema, WideColumnStore,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

type Partition = BTreeMap<Vec<KeyPart>, Row>;

#[derive(Debug)]
struct MemoryTable {
    schema: TableSchema,
    partitions: BTreeMap<Vec<KeyPart>, Partition>,
}

/// A [`WideColumnStore`] kept in process memory.
///
/// Consistency levels are accepted and ignored: there is a single replica. Clones share the same
/// tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, MemoryTable>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of rows in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .get(table)
            .map_or(0, |t| t.partitions.values().map(BTreeMap::len).sum())
    }

    /// Every row of every table, keyed by table name, in primary key order.
    pub fn dump(&self) -> BTreeMap<String, Vec<Row>> {
        self.tables
            .read()
            .iter()
            .map(|(name, table)| {
                let rows = table.partitions.values().flat_map(|p| p.values().cloned()).collect();
                (name.clone(), rows)
            })
            .collect()
    }
}

#[async_trait]
impl WideColumnStore for MemoryStore {
    async fn create_table(&self, schema: &TableSchema) -> Result<(), StoreError> {
        self.tables.write().entry(schema.name.clone()).or_insert_with(|| MemoryTable {
            schema: schema.clone(),
            partitions: BTreeMap::new(),
        });
        Ok(())
    }

    async fn execute(
        &self,
        statement: Statement,
        _consistency: Consistency,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(statement.table())
            .ok_or_else(|| StoreError::UnknownTable(statement.table().to_string()))?;

        match statement {
            Statement::Insert { row, if_not_exists, .. } => {
                let partition = table.schema.partition_of(&row)?;
                let clustering = table.schema.clustering_of(&row)?;
                let rows = table.partitions.entry(partition).or_default();
                match rows.get_mut(&clustering) {
                    Some(_) if if_not_exists => return Ok(false),
                    Some(existing) => existing.merge(row),
                    None => {
                        rows.insert(clustering, row);
                    }
                }
                Ok(true)
            }
            Statement::Delete { key, .. } => {
                let split = table.schema.partition_key.len();
                if key.len() != table.schema.key_len() {
                    return Err(StoreError::MissingColumn(format!(
                        "{}: key has {} of {} components",
                        table.schema.name,
                        key.len(),
                        table.schema.key_len()
                    )));
                }
                let (partition, clustering) = key.split_at(split);
                if let Some(rows) = table.partitions.get_mut(partition) {
                    rows.remove(clustering);
                    if rows.is_empty() {
                        table.partitions.remove(partition);
                    }
                }
                Ok(true)
            }
        }
    }

    async fn query(
        &self,
        select: &Select,
        _consistency: Consistency,
    ) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.read();
        let table =
            tables.get(&select.table).ok_or_else(|| StoreError::UnknownTable(select.table.clone()))?;
        let Some(rows) = table.partitions.get(&select.partition) else {
            return Ok(Vec::new());
        };

        let matching = rows.iter().filter(|(key, _)| select.admits(key)).map(|(_, row)| row);
        let limit = select.limit.unwrap_or(usize::MAX);
        let rows = match select.order.unwrap_or(table.schema.order) {
            Order::Asc => matching.take(limit).cloned().collect(),
            Order::Desc => matching.rev().take(limit).cloned().collect(),
        };
        Ok(rows)
    }

    async fn partition_keys(
        &self,
        table: &str,
        _consistency: Consistency,
    ) -> Result<Vec<Vec<KeyPart>>, StoreError> {
        let tables = self.tables.read();
        let table = tables.get(table).ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(table.partitions.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new("heights", &["bucket"], &["height"]).ordered(Order::Desc)
    }

    fn row(bucket: u64, height: u64, hash: &str) -> Row {
        Row::new().with("bucket", bucket).with("height", height).with("hash", hash)
    }

    #[tokio::test]
    async fn test_insert_query_delete() {
        let store = MemoryStore::new();
        store.create_table(&schema()).await.unwrap();
        for height in 0..5 {
            let applied = store
                .execute(Statement::insert("heights", row(0, height, "h")), Consistency::One)
                .await
                .unwrap();
            assert!(applied);
        }

        let select = Select::partition("heights", vec![KeyPart::Long(0)]).range(1u64, 3u64);
        let heights: Vec<u64> = store
            .query(&select, Consistency::One)
            .await
            .unwrap()
            .iter()
            .map(|r| r.long("height").unwrap())
            .collect();
        assert_eq!(heights, vec![3, 2, 1]);

        let first = store
            .query(&select.clone().order(Order::Asc).limit(1), Consistency::One)
            .await
            .unwrap();
        assert_eq!(first[0].long("height").unwrap(), 1);

        for height in 0..5 {
            let key = vec![KeyPart::Long(0), KeyPart::Long(height)];
            store.execute(Statement::delete("heights", key), Consistency::One).await.unwrap();
        }
        assert_eq!(store.row_count("heights"), 0);
        assert!(store.partition_keys("heights", Consistency::One).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conditional_insert_and_upsert() {
        let store = MemoryStore::new();
        store.create_table(&schema()).await.unwrap();
        let insert = |hash| Statement::insert_if_not_exists("heights", row(0, 1, hash));
        assert!(store.execute(insert("a"), Consistency::Quorum).await.unwrap());
        assert!(!store.execute(insert("b"), Consistency::Quorum).await.unwrap());

        let extra = row(0, 1, "a").with("timestamp", 9u64);
        store.execute(Statement::insert("heights", extra), Consistency::One).await.unwrap();
        let sparse = Row::new().with("bucket", 0u64).with("height", 1u64);
        store.execute(Statement::insert("heights", sparse), Consistency::One).await.unwrap();

        let rows = store
            .query(&Select::partition("heights", vec![KeyPart::Long(0)]), Consistency::One)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("hash").unwrap(), "a");
        assert_eq!(rows[0].long("timestamp").unwrap(), 9);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let store = MemoryStore::new();
        let err = store
            .execute(Statement::insert("nope", Row::new()), Consistency::One)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownTable(t) if t == "nope"));
    }
}
