//! Table layouts, statements and consistency levels.

use crate::{KeyPart, Row, StoreError};
use derive_more::Display;

/// Clustering order of a table or a query.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    /// Ascending.
    #[default]
    #[display("asc")]
    Asc,
    /// Descending.
    #[display("desc")]
    Desc,
}

/// How many replicas must acknowledge an operation.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Consistency {
    /// A single replica.
    #[default]
    One,
    /// A majority of the local datacenter.
    LocalQuorum,
    /// A majority of all replicas.
    Quorum,
    /// Every replica.
    All,
}

/// The layout of a table: its name, the columns forming the partition key and the columns
/// ordering rows inside a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// The table name.
    pub name: String,
    /// Partition key columns.
    pub partition_key: Vec<&'static str>,
    /// Clustering key columns.
    pub clustering_key: Vec<&'static str>,
    /// Order of rows inside a partition.
    pub order: Order,
}

impl TableSchema {
    /// An ascending table.
    pub fn new(
        name: impl Into<String>,
        partition_key: &[&'static str],
        clustering_key: &[&'static str],
    ) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.to_vec(),
            clustering_key: clustering_key.to_vec(),
            order: Order::Asc,
        }
    }

    /// Sets the clustering order.
    pub const fn ordered(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// The partition key of `row`.
    pub fn partition_of(&self, row: &Row) -> Result<Vec<KeyPart>, StoreError> {
        self.key_of(row, &self.partition_key)
    }

    /// The clustering key of `row`.
    pub fn clustering_of(&self, row: &Row) -> Result<Vec<KeyPart>, StoreError> {
        self.key_of(row, &self.clustering_key)
    }

    /// The full primary key of `row`: partition key then clustering key.
    pub fn primary_key(&self, row: &Row) -> Result<Vec<KeyPart>, StoreError> {
        let mut key = self.partition_of(row)?;
        key.extend(self.clustering_of(row)?);
        Ok(key)
    }

    /// The number of key components of a full primary key.
    pub fn key_len(&self) -> usize {
        self.partition_key.len() + self.clustering_key.len()
    }

    fn key_of(&self, row: &Row, columns: &[&'static str]) -> Result<Vec<KeyPart>, StoreError> {
        columns
            .iter()
            .map(|column| {
                row.get(column)
                    .ok_or_else(|| StoreError::MissingColumn(format!("{}.{column}", self.name)))?
                    .as_key()
                    .ok_or_else(|| StoreError::Type {
                        column: format!("{}.{column}", self.name),
                        expected: "long or text key",
                    })
            })
            .collect()
    }
}

/// A write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Upserts a row: columns of an existing row that `row` does not set are kept.
    Insert {
        /// The table.
        table: String,
        /// The row, including its key columns.
        row: Row,
        /// Only write if no row exists under the same primary key.
        if_not_exists: bool,
    },
    /// Deletes the row with the given primary key.
    Delete {
        /// The table.
        table: String,
        /// The full primary key.
        key: Vec<KeyPart>,
    },
}

impl Statement {
    /// An upsert.
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Self::Insert { table: table.into(), row, if_not_exists: false }
    }

    /// An insert that is not applied when the row exists.
    pub fn insert_if_not_exists(table: impl Into<String>, row: Row) -> Self {
        Self::Insert { table: table.into(), row, if_not_exists: true }
    }

    /// A delete by primary key.
    pub fn delete(table: impl Into<String>, key: Vec<KeyPart>) -> Self {
        Self::Delete { table: table.into(), key }
    }

    /// The table the statement writes.
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Delete { table, .. } => table,
        }
    }
}

/// A read of one partition, optionally bounded on the first clustering column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    /// The table.
    pub table: String,
    /// The full partition key.
    pub partition: Vec<KeyPart>,
    /// Inclusive lower bound on the first clustering column.
    pub lower: Option<KeyPart>,
    /// Inclusive upper bound on the first clustering column.
    pub upper: Option<KeyPart>,
    /// Overrides the table's clustering order.
    pub order: Option<Order>,
    /// Maximum number of rows returned.
    pub limit: Option<usize>,
}

impl Select {
    /// Every row of a partition.
    pub fn partition(table: impl Into<String>, partition: Vec<KeyPart>) -> Self {
        Self {
            table: table.into(),
            partition,
            lower: None,
            upper: None,
            order: None,
            limit: None,
        }
    }

    /// Bounds the first clustering column to `[lower, upper]`.
    pub fn range(mut self, lower: impl Into<KeyPart>, upper: impl Into<KeyPart>) -> Self {
        self.lower = Some(lower.into());
        self.upper = Some(upper.into());
        self
    }

    /// Restricts the first clustering column to `key`.
    pub fn key(self, key: impl Into<KeyPart> + Clone) -> Self {
        self.range(key.clone(), key)
    }

    /// Sets the order of the returned rows.
    pub const fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    /// Caps the number of returned rows.
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns `true` if `clustering` falls inside the bounds.
    pub fn admits(&self, clustering: &[KeyPart]) -> bool {
        let Some(first) = clustering.first() else {
            return true;
        };
        self.lower.as_ref().is_none_or(|lower| first >= lower)
            && self.upper.as_ref().is_none_or(|upper| first <= upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key() {
        let schema = TableSchema::new("t", &["partition_id", "bucket_id"], &["height"]);
        let row = Row::new()
            .with("partition_id", 0u64)
            .with("bucket_id", 1u64)
            .with("height", 1_005u64)
            .with("hash", "h");
        assert_eq!(
            schema.primary_key(&row).unwrap(),
            vec![KeyPart::Long(0), KeyPart::Long(1), KeyPart::Long(1_005)]
        );
        let missing = Row::new().with("partition_id", 0u64);
        assert!(matches!(
            schema.primary_key(&missing),
            Err(StoreError::MissingColumn(c)) if c == "t.bucket_id"
        ));
    }

    #[test]
    fn test_select_bounds() {
        let select = Select::partition("t", vec![]).range(5u64, 7u64);
        assert!(!select.admits(&[KeyPart::Long(4)]));
        assert!(select.admits(&[KeyPart::Long(5), KeyPart::Long(99)]));
        assert!(select.admits(&[KeyPart::Long(7)]));
        assert!(!select.admits(&[KeyPart::Long(8)]));
    }
}
