//! The seams of the storage adapter.

use crate::{Consistency, KeyPart, Row, Select, Statement, StoreError, TableSchema};
use async_trait::async_trait;
use std::fmt::Debug;
use weave_protocol::Transaction;

/// A keyed wide-column store.
///
/// Writes are per row and there are no cross-row transactions. The only conditional write is
/// [`Statement::Insert`] with `if_not_exists`.
#[async_trait]
pub trait WideColumnStore: Debug + Send + Sync {
    /// Creates a table if it does not exist.
    async fn create_table(&self, schema: &TableSchema) -> Result<(), StoreError>;

    /// Executes a write. Returns whether it was applied, which is only ever `false` for a
    /// conditional insert that found an existing row.
    async fn execute(
        &self,
        statement: Statement,
        consistency: Consistency,
    ) -> Result<bool, StoreError>;

    /// Reads rows of one partition.
    async fn query(&self, select: &Select, consistency: Consistency)
    -> Result<Vec<Row>, StoreError>;

    /// The distinct partition keys of a table, ascending.
    async fn partition_keys(
        &self,
        table: &str,
        consistency: Consistency,
    ) -> Result<Vec<Vec<KeyPart>>, StoreError>;
}

/// Contributes extra writes for every imported transaction.
///
/// The statements are issued together with the transaction's own rows.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait TxPostProcessor: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// The statements to issue for `tx`, imported at `height`.
    fn process(&self, tx: &Transaction, height: u64) -> Vec<Statement>;
}
