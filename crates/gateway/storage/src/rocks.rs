//! A [`WideColumnStore`] on a local RocksDB database.

use crate::{
    Consistency, KeyPart, Order, Row, Select, Statement, StoreError, TableSchema, WideColumnStore,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rocksdb::{DB, Direction, IteratorMode, Options, ReadOptions};
use std::{collections::HashMap, path::Path, sync::Arc};

const LONG: u8 = 0x01;
const TEXT: u8 = 0x02;

#[derive(Debug)]
struct Inner {
    db: DB,
    schemas: RwLock<HashMap<String, TableSchema>>,
    /// Serializes conditional inserts.
    write_lock: Mutex<()>,
}

/// A [`WideColumnStore`] persisted in RocksDB.
///
/// All tables share the default column family. A row lives under
/// `table 0x00 | partition key | clustering key`, with every key component encoded so that the
/// byte order of the encoding is the order of [`KeyPart`]. Rows are stored as JSON.
///
/// One process owns the database, so consistency levels are accepted and ignored.
#[derive(Debug, Clone)]
pub struct RocksStore {
    inner: Arc<Inner>,
}

impl RocksStore {
    /// Opens or creates the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
        let db = DB::open(&opts, path.as_ref())?;
        info!(target: "storage", path = %path.as_ref().display(), "Opened rocksdb store");
        Ok(Self {
            inner: Arc::new(Inner {
                db,
                schemas: RwLock::new(HashMap::new()),
                write_lock: Mutex::new(()),
            }),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?
    }
}

impl Inner {
    fn schema(&self, table: &str) -> Result<TableSchema, StoreError> {
        self.schemas.read().get(table).cloned().ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    fn execute(&self, statement: Statement) -> Result<bool, StoreError> {
        let schema = self.schema(statement.table())?;
        match statement {
            Statement::Insert { row, if_not_exists, .. } => {
                let key = row_key(&schema.name, &schema.primary_key(&row)?);
                let _guard = self.write_lock.lock();
                let row = match self.db.get(&key)? {
                    Some(_) if if_not_exists => return Ok(false),
                    Some(existing) => {
                        let mut existing = decode_row(&existing)?;
                        existing.merge(row);
                        existing
                    }
                    None => row,
                };
                self.db.put(&key, encode_row(&row)?)?;
                Ok(true)
            }
            Statement::Delete { key, .. } => {
                self.db.delete(row_key(&schema.name, &key))?;
                Ok(true)
            }
        }
    }

    fn query(&self, select: &Select) -> Result<Vec<Row>, StoreError> {
        let schema = self.schema(&select.table)?;
        let prefix = row_key(&schema.name, &select.partition);
        let lower = match &select.lower {
            Some(lower) => concat(&prefix, lower),
            None => prefix.clone(),
        };
        let upper = match &select.upper {
            Some(upper) => successor(&concat(&prefix, upper)),
            None => successor(&prefix),
        };

        let mut opts = ReadOptions::default();
        opts.set_iterate_lower_bound(lower);
        if let Some(upper) = upper {
            opts.set_iterate_upper_bound(upper);
        }
        let mode = match select.order.unwrap_or(schema.order) {
            Order::Asc => IteratorMode::Start,
            Order::Desc => IteratorMode::End,
        };

        let mut rows = Vec::new();
        for entry in self.db.iterator_opt(mode, opts) {
            if select.limit.is_some_and(|limit| rows.len() >= limit) {
                break;
            }
            let (_, value) = entry?;
            rows.push(decode_row(&value)?);
        }
        Ok(rows)
    }

    fn partition_keys(&self, table: &str) -> Result<Vec<Vec<KeyPart>>, StoreError> {
        let schema = self.schema(table)?;
        let prefix = row_key(&schema.name, &[]);
        let mut cursor = prefix.clone();
        let mut partitions = Vec::new();
        // Skip scan: seek to the first key after each partition found.
        loop {
            let Some(entry) = self.db.iterator(IteratorMode::From(&cursor, Direction::Forward)).next()
            else {
                break;
            };
            let (key, _) = entry?;
            let Some(encoded) = key.strip_prefix(prefix.as_slice()) else {
                break;
            };
            let partition = decode_parts(encoded, schema.partition_key.len())?;
            let Some(next) = successor(&row_key(&schema.name, &partition)) else {
                break;
            };
            partitions.push(partition);
            cursor = next;
        }
        Ok(partitions)
    }
}

#[async_trait]
impl WideColumnStore for RocksStore {
    async fn create_table(&self, schema: &TableSchema) -> Result<(), StoreError> {
        self.inner.schemas.write().entry(schema.name.clone()).or_insert_with(|| schema.clone());
        Ok(())
    }

    async fn execute(
        &self,
        statement: Statement,
        _consistency: Consistency,
    ) -> Result<bool, StoreError> {
        self.blocking(move |inner| inner.execute(statement)).await
    }

    async fn query(
        &self,
        select: &Select,
        _consistency: Consistency,
    ) -> Result<Vec<Row>, StoreError> {
        let select = select.clone();
        self.blocking(move |inner| inner.query(&select)).await
    }

    async fn partition_keys(
        &self,
        table: &str,
        _consistency: Consistency,
    ) -> Result<Vec<Vec<KeyPart>>, StoreError> {
        let table = table.to_string();
        self.blocking(move |inner| inner.partition_keys(&table)).await
    }
}

fn row_key(table: &str, parts: &[KeyPart]) -> Vec<u8> {
    let mut key = Vec::with_capacity(table.len() + 1 + parts.len() * 9);
    key.extend_from_slice(table.as_bytes());
    key.push(0x00);
    for part in parts {
        encode_part(&mut key, part);
    }
    key
}

fn concat(prefix: &[u8], part: &KeyPart) -> Vec<u8> {
    let mut key = prefix.to_vec();
    encode_part(&mut key, part);
    key
}

/// Texts are terminated by `0x00 0x00`, with embedded `0x00` escaped as `0x00 0xff`.
fn encode_part(out: &mut Vec<u8>, part: &KeyPart) {
    match part {
        KeyPart::Long(v) => {
            out.push(LONG);
            out.extend_from_slice(&v.to_be_bytes());
        }
        KeyPart::Text(v) => {
            out.push(TEXT);
            for byte in v.as_bytes() {
                out.push(*byte);
                if *byte == 0x00 {
                    out.push(0xff);
                }
            }
            out.extend_from_slice(&[0x00, 0x00]);
        }
    }
}

fn decode_parts(mut bytes: &[u8], count: usize) -> Result<Vec<KeyPart>, StoreError> {
    let corrupt = || StoreError::Codec("corrupt row key".to_string());
    let mut parts = Vec::with_capacity(count);
    while parts.len() < count {
        let (&tag, rest) = bytes.split_first().ok_or_else(corrupt)?;
        match tag {
            LONG => {
                let (raw, rest) = rest.split_first_chunk::<8>().ok_or_else(corrupt)?;
                parts.push(KeyPart::Long(u64::from_be_bytes(*raw)));
                bytes = rest;
            }
            TEXT => {
                let mut text = Vec::new();
                let mut i = 0;
                loop {
                    match (rest.get(i), rest.get(i + 1)) {
                        (Some(0x00), Some(0x00)) => break,
                        (Some(0x00), Some(0xff)) => {
                            text.push(0x00);
                            i += 2;
                        }
                        (Some(byte), _) => {
                            text.push(*byte);
                            i += 1;
                        }
                        (None, _) => return Err(corrupt()),
                    }
                }
                let text = String::from_utf8(text).map_err(|_| corrupt())?;
                parts.push(KeyPart::Text(text));
                bytes = &rest[i + 2..];
            }
            _ => return Err(corrupt()),
        }
    }
    Ok(parts)
}

/// The smallest key greater than every key starting with `prefix`, if one exists.
fn successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut next = prefix.to_vec();
    while let Some(last) = next.pop() {
        if last < 0xff {
            next.push(last + 1);
            return Some(next);
        }
    }
    None
}

fn encode_row(row: &Row) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(row).map_err(|err| StoreError::Codec(err.to_string()))
}

fn decode_row(bytes: &[u8]) -> Result<Row, StoreError> {
    serde_json::from_slice(bytes).map_err(|err| StoreError::Codec(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn key_part() -> impl Strategy<Value = KeyPart> {
        prop_oneof![any::<u64>().prop_map(KeyPart::Long), ".{0,6}".prop_map(KeyPart::Text)]
    }

    proptest! {
        #[test]
        fn prop_key_encoding_is_monotonic(
            (a, b) in (1usize..4).prop_flat_map(|len| {
                (prop::collection::vec(key_part(), len), prop::collection::vec(key_part(), len))
            }),
        ) {
            prop_assert_eq!(a.cmp(&b), row_key("t", &a).cmp(&row_key("t", &b)));
        }
    }

    #[test]
    fn test_key_encoding_preserves_order() {
        let keys = [
            vec![KeyPart::Long(1), KeyPart::Long(2)],
            vec![KeyPart::Long(1), KeyPart::Long(256)],
            vec![KeyPart::Long(2), KeyPart::Text(String::new())],
            vec![KeyPart::Long(2), KeyPart::Text("a".into())],
            vec![KeyPart::Long(2), KeyPart::Text("a\0b".into())],
            vec![KeyPart::Long(2), KeyPart::Text("ab".into())],
        ];
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(row_key("t", &pair[0]) < row_key("t", &pair[1]), "{pair:?}");
        }
        for key in &keys {
            let encoded = row_key("t", key);
            assert_eq!(&decode_parts(&encoded[2..], key.len()).unwrap(), key);
        }
    }

    #[tokio::test]
    async fn test_rocks_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let schema = TableSchema::new("h", &["bucket"], &["height"]);
        store.create_table(&schema).await.unwrap();

        for (bucket, height) in [(0u64, 1u64), (0, 2), (1, 1_000), (3, 3_000)] {
            let row = Row::new().with("bucket", bucket).with("height", height).with("hash", "x");
            store.execute(Statement::insert("h", row), Consistency::One).await.unwrap();
        }
        let row = Row::new().with("bucket", 0u64).with("height", 2u64).with("hash", "y");
        let applied =
            store.execute(Statement::insert_if_not_exists("h", row), Consistency::Quorum).await;
        assert!(!applied.unwrap());

        let partitions = store.partition_keys("h", Consistency::One).await.unwrap();
        assert_eq!(
            partitions,
            vec![vec![KeyPart::Long(0)], vec![KeyPart::Long(1)], vec![KeyPart::Long(3)]]
        );

        let select = Select::partition("h", vec![KeyPart::Long(0)]).order(Order::Desc).limit(1);
        let rows = store.query(&select, Consistency::One).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].long("height").unwrap(), 2);
        assert_eq!(rows[0].text("hash").unwrap(), "x");

        store
            .execute(Statement::delete("h", vec![KeyPart::Long(0), KeyPart::Long(2)]), Consistency::One)
            .await
            .unwrap();
        let select = Select::partition("h", vec![KeyPart::Long(0)]).range(0u64, 10u64);
        assert_eq!(store.query(&select, Consistency::One).await.unwrap().len(), 1);
    }
}
