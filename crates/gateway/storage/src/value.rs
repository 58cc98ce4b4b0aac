//! Cell values and rows.

use crate::StoreError;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use weave_protocol::{Numeric, U256};

/// One component of a partition or clustering key.
///
/// Longs sort before texts, and each kind sorts by its natural order.
#[derive(
    Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum KeyPart {
    /// A 64 bit integer key.
    Long(u64),
    /// A text key.
    #[display("{_0:?}")]
    Text(String),
}

impl From<u64> for KeyPart {
    fn from(value: u64) -> Self {
        Self::Long(value)
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A cell value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Value {
    /// Text.
    Text(String),
    /// A 64 bit integer.
    Long(u64),
    /// An arbitrary precision integer.
    Varint(U256),
    /// A boolean.
    Bool(bool),
    /// An ordered list of texts.
    List(Vec<String>),
    /// An ordered list of `(name, value)` tuples.
    Pairs(Vec<(String, String)>),
}

impl Value {
    /// The value as a key component, if it can be one.
    pub fn as_key(&self) -> Option<KeyPart> {
        match self {
            Self::Long(v) => Some(KeyPart::Long(*v)),
            Self::Text(v) => Some(KeyPart::Text(v.clone())),
            _ => None,
        }
    }
}

impl From<KeyPart> for Value {
    fn from(key: KeyPart) -> Self {
        match key {
            KeyPart::Long(v) => Self::Long(v),
            KeyPart::Text(v) => Self::Text(v),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Long(value)
    }
}

impl From<U256> for Value {
    fn from(value: U256) -> Self {
        Self::Varint(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<(String, String)>> for Value {
    fn from(value: Vec<(String, String)>) -> Self {
        Self::Pairs(value)
    }
}

/// A row: column name to value. Absent columns are unset, not empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    /// An empty row.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets a column.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets a column only if a value is given.
    pub fn with_opt<V: Into<Value>>(mut self, column: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.insert(column, value);
        }
        self
    }

    /// Sets a column.
    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        self.0.insert(column.to_string(), value.into());
    }

    /// Copies every column of `other` into `self`, overwriting shared columns.
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// The value of a column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// The set columns.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// A required text column.
    pub fn text(&self, column: &str) -> Result<&str, StoreError> {
        self.opt_text(column)?.ok_or_else(|| StoreError::MissingColumn(column.to_string()))
    }

    /// An optional text column.
    pub fn opt_text(&self, column: &str) -> Result<Option<&str>, StoreError> {
        match self.get(column) {
            None => Ok(None),
            Some(Value::Text(v)) => Ok(Some(v)),
            Some(_) => Err(type_error(column, "text")),
        }
    }

    /// A required long column.
    pub fn long(&self, column: &str) -> Result<u64, StoreError> {
        self.opt_long(column)?.ok_or_else(|| StoreError::MissingColumn(column.to_string()))
    }

    /// An optional long column.
    pub fn opt_long(&self, column: &str) -> Result<Option<u64>, StoreError> {
        match self.get(column) {
            None => Ok(None),
            Some(Value::Long(v)) => Ok(Some(*v)),
            Some(_) => Err(type_error(column, "long")),
        }
    }

    /// A numeric column coerced to an exact integer. Unset reads as zero.
    pub fn varint(&self, column: &str) -> Result<U256, StoreError> {
        Ok(self.numeric(column)?.coerce()?)
    }

    /// An optional numeric column coerced to an exact integer.
    pub fn opt_varint(&self, column: &str) -> Result<Option<U256>, StoreError> {
        match self.numeric(column)? {
            Numeric::Unset => Ok(None),
            numeric => Ok(Some(numeric.coerce()?)),
        }
    }

    fn numeric(&self, column: &str) -> Result<Numeric, StoreError> {
        match self.get(column) {
            None => Ok(Numeric::Unset),
            Some(Value::Varint(v)) => Ok(Numeric::Big(*v)),
            Some(Value::Long(v)) => Ok(Numeric::Int(*v)),
            Some(Value::Text(v)) => Ok(Numeric::Text(v.clone())),
            Some(_) => Err(type_error(column, "varint")),
        }
    }

    /// A list column. Unset reads as empty.
    pub fn list(&self, column: &str) -> Result<Vec<String>, StoreError> {
        match self.get(column) {
            None => Ok(Vec::new()),
            Some(Value::List(v)) => Ok(v.clone()),
            Some(_) => Err(type_error(column, "list")),
        }
    }

    /// A tuple list column. Unset reads as empty.
    pub fn pairs(&self, column: &str) -> Result<Vec<(String, String)>, StoreError> {
        match self.get(column) {
            None => Ok(Vec::new()),
            Some(Value::Pairs(v)) => Ok(v.clone()),
            Some(_) => Err(type_error(column, "list<tuple<text, text>>")),
        }
    }
}

fn type_error(column: &str, expected: &'static str) -> StoreError {
    StoreError::Type { column: column.to_string(), expected }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_row() {
        let row = Row::new().with("id", "a").with_opt::<String>("target", None).with("size", 0u64);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "size"]);
        assert_eq!(row.opt_text("target").unwrap(), None);
        assert!(matches!(row.text("target"), Err(StoreError::MissingColumn(c)) if c == "target"));
        assert!(matches!(row.long("id"), Err(StoreError::Type { expected: "long", .. })));
    }

    #[test]
    fn test_varint_coercion() {
        let row = Row::new()
            .with("big", U256::MAX)
            .with("long", 7u64)
            .with("text", "66000000000000000000000")
            .with("empty", "");
        assert_eq!(row.varint("big").unwrap(), U256::MAX);
        assert_eq!(row.varint("long").unwrap(), U256::from(7u64));
        assert_eq!(row.varint("text").unwrap().to_string(), "66000000000000000000000");
        assert_eq!(row.varint("empty").unwrap(), U256::ZERO);
        assert_eq!(row.varint("unset").unwrap(), U256::ZERO);
        assert_eq!(row.opt_varint("unset").unwrap(), None);
    }

    #[test]
    fn test_key_order() {
        assert!(KeyPart::Long(u64::MAX) < KeyPart::Text(String::new()));
        assert!(KeyPart::from(9u64) < KeyPart::from(10u64));
        assert_eq!(Value::from(KeyPart::from("a")).as_key(), Some(KeyPart::from("a")));
        assert_eq!(Value::List(vec![]).as_key(), None);
    }
}
