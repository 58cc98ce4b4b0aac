//! The generated GQL projection tables.
//!
//! GQL queries filter transactions by any combination of id, owner, target, bundle and data root,
//! optionally by a tag, and page through them by ascending or descending index. Each combination
//! is served by its own table whose partition key carries the filtered values, so that every
//! query is a single partition range scan. The set of tables is generated: every subset of
//! [`GqlField`] crossed with untagged/tagged and asc/desc.

use super::block::bucketed;
use crate::{Order, Row, TableSchema};
use weave_protocol::{Bucketing, Transaction};

/// A filterable transaction field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GqlField {
    /// `tx_id`
    TxId,
    /// `owner`
    Owner,
    /// `target`
    Target,
    /// `bundled_in`
    BundledIn,
    /// `data_root`
    DataRoot,
}

impl GqlField {
    /// Every field, in table naming order.
    pub const ALL: [Self; 5] =
        [Self::TxId, Self::Owner, Self::Target, Self::BundledIn, Self::DataRoot];

    /// The column name.
    pub const fn column(self) -> &'static str {
        match self {
            Self::TxId => "tx_id",
            Self::Owner => "owner",
            Self::Target => "target",
            Self::BundledIn => "bundled_in",
            Self::DataRoot => "data_root",
        }
    }

    /// The value of the field on `tx`, if populated.
    pub fn value_of(self, tx: &Transaction) -> Option<&str> {
        match self {
            Self::TxId => Some(tx.id.as_str()).filter(|id| !id.is_empty()),
            Self::Owner => Some(tx.owner.as_str()).filter(|owner| !owner.is_empty()),
            Self::Target => tx.target(),
            Self::BundledIn => tx.bundled_in(),
            Self::DataRoot => tx.data_root(),
        }
    }

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// A subset of [`GqlField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FilterSet(u8);

impl FilterSet {
    /// No filter.
    pub const EMPTY: Self = Self(0);

    /// Every subset, from the empty set up.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..1u8 << GqlField::ALL.len()).map(Self)
    }

    /// The set of the given fields.
    pub fn of(fields: &[GqlField]) -> Self {
        Self(fields.iter().fold(0, |bits, field| bits | field.bit()))
    }

    /// Returns `true` if `field` is in the set.
    pub const fn contains(self, field: GqlField) -> bool {
        self.0 & field.bit() != 0
    }

    /// The fields of the set, in table naming order.
    pub fn fields(self) -> impl Iterator<Item = GqlField> {
        GqlField::ALL.into_iter().filter(move |field| self.contains(*field))
    }

    /// Returns `true` if every field of the set is populated on `tx`.
    pub fn satisfied_by(self, tx: &Transaction) -> bool {
        self.fields().all(|field| field.value_of(tx).is_some())
    }
}

/// One projection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GqlProjection {
    /// The filtered fields.
    pub filters: FilterSet,
    /// Whether the table is additionally keyed by one tag.
    pub tagged: bool,
    /// The clustering order.
    pub order: Order,
}

impl GqlProjection {
    /// Every projection table.
    pub fn all() -> impl Iterator<Item = Self> {
        FilterSet::all().flat_map(|filters| {
            [false, true].into_iter().flat_map(move |tagged| {
                [Order::Asc, Order::Desc].into_iter().map(move |order| Self {
                    filters,
                    tagged,
                    order,
                })
            })
        })
    }

    /// The table name, `tx_gql[_by_<fields>]_<order>` or `tx_tag_gql[_by_<fields>]_<order>`.
    pub fn table_name(&self) -> String {
        let mut name = String::from(if self.tagged { "tx_tag_gql" } else { "tx_gql" });
        if self.filters != FilterSet::EMPTY {
            name.push_str("_by");
            for field in self.filters.fields() {
                name.push('_');
                name.push_str(field.column());
            }
        }
        name.push('_');
        name.push_str(&self.order.to_string());
        name
    }

    /// The table layout.
    pub fn schema(&self) -> TableSchema {
        let mut partition_key = vec!["partition_id", "bucket_id"];
        partition_key.extend(self.filters.fields().map(GqlField::column));
        let clustering_key: &[&'static str] = if self.tagged {
            partition_key.extend(["tag_name", "tag_value"]);
            &["tx_index", "tag_index"]
        } else {
            &["tx_index"]
        };
        TableSchema::new(self.table_name(), &partition_key, clustering_key).ordered(self.order)
    }

    /// The rows `tx` contributes to this table: none if a filtered field is not populated, one
    /// per tag for tagged tables, one otherwise.
    pub fn rows(&self, tx: &Transaction, tx_index: u64, block_height: u64) -> Vec<Row> {
        if !self.filters.satisfied_by(tx) {
            return Vec::new();
        }
        let mut base = bucketed(Bucketing::for_tx_index(tx_index))
            .with("tx_index", tx_index)
            .with("block_height", block_height)
            .with("data_size", tx.data_size);
        for field in GqlField::ALL {
            base = base.with_opt(field.column(), field.value_of(tx));
        }

        if !self.tagged {
            return vec![base];
        }
        tx.tags
            .iter()
            .zip(0u64..)
            .map(|(tag, tag_index)| {
                base.clone()
                    .with("tag_index", tag_index)
                    .with("tag_name", tag.name.as_str())
                    .with("tag_value", tag.value.as_str())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use weave_protocol::Tag;

    #[test]
    fn test_projection_set() {
        let all: Vec<_> = GqlProjection::all().collect();
        assert_eq!(all.len(), 128);
        assert_eq!(all[0].table_name(), "tx_gql_asc");
        assert_eq!(all[3].table_name(), "tx_tag_gql_desc");
    }

    #[rstest]
    #[case(&[], false, Order::Asc, "tx_gql_asc")]
    #[case(&[GqlField::Owner], false, Order::Desc, "tx_gql_by_owner_desc")]
    #[case(&[GqlField::DataRoot, GqlField::TxId], true, Order::Asc, "tx_tag_gql_by_tx_id_data_root_asc")]
    fn test_table_name(
        #[case] fields: &[GqlField],
        #[case] tagged: bool,
        #[case] order: Order,
        #[case] name: &str,
    ) {
        let projection = GqlProjection { filters: FilterSet::of(fields), tagged, order };
        assert_eq!(projection.table_name(), name);
    }

    #[test]
    fn test_rows_respect_populated_fields() {
        let tx = Transaction {
            id: "id".into(),
            owner: "owner".into(),
            target: "target".into(),
            tags: vec![Tag::from_utf8("a", "1"), Tag::from_utf8("b", "2")],
            ..Default::default()
        };
        let by_target = GqlProjection {
            filters: FilterSet::of(&[GqlField::Owner, GqlField::Target]),
            tagged: false,
            order: Order::Asc,
        };
        let rows = by_target.rows(&tx, 5, 0);
        assert_eq!(rows.len(), 1);
        assert!(by_target.schema().primary_key(&rows[0]).is_ok());

        let by_root = GqlProjection { filters: FilterSet::of(&[GqlField::DataRoot]), ..by_target };
        assert!(by_root.rows(&tx, 5, 0).is_empty());

        let tagged = GqlProjection { tagged: true, ..by_target };
        let rows = tagged.rows(&tx, 5, 0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].text("tag_name").unwrap(), Tag::from_utf8("b", "2").name);
        assert!(tagged.schema().primary_key(&rows[1]).is_ok());
    }

    #[test]
    fn test_every_populated_transaction_hits_every_untagged_table() {
        let tx = Transaction {
            id: "id".into(),
            owner: "o".into(),
            target: "t".into(),
            data_root: "r".into(),
            bundled_in: Some("b".into()),
            ..Default::default()
        };
        let hits = GqlProjection::all().filter(|p| !p.tagged && !p.rows(&tx, 0, 0).is_empty());
        assert_eq!(hits.count(), 64);
    }
}
