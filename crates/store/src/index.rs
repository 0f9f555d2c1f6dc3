//! Secondary indexes
//!
//! Two kinds are supported: table indexes (columns local to one table) and
//! group indexes (columns spanning the tables of one root-to-anchor
//! branch). Both store entries as `tree prefix ++ encoded column values ++
//! anchor HKey bytes` with an empty payload, so entries are independently
//! keyed and uniqueness is a bounded range probe over the value prefix.
//!
//! The primary-key index every table carries implicitly is not an
//! `IndexDef`; it maps encoded PK values directly to HKey bytes and lives
//! in its own tree (see the engine).

use crate::encoding::{self, encode_value};
use crate::error::{Error, Result};
use crate::group::GroupSchema;
use crate::naming;
use crate::types::schema::TableName;
use crate::types::value::Value;

/// Caller-facing index definition.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: String,
    pub unique: bool,
    /// Indexed columns as `(table, column name)`. A single table makes a
    /// table index; tables along one branch make a group index.
    pub columns: Vec<(TableName, String)>,
}

/// A resolved index over one group.
#[derive(Debug)]
pub struct IndexDef {
    pub name: String,
    pub tree_name: String,
    pub(crate) tree_prefix: Vec<u8>,
    pub unique: bool,
    /// The deepest contributing table; its rows anchor the entries.
    pub(crate) anchor: usize,
    /// Resolved `(table position, column index)` pairs.
    pub(crate) columns: Vec<(usize, usize)>,
}

impl IndexDef {
    /// Resolve and validate a spec against a group.
    pub(crate) fn build(group: &GroupSchema, spec: &IndexSpec) -> Result<IndexDef> {
        if spec.name.is_empty() {
            return Err(Error::InvalidSchema("index name cannot be empty".into()));
        }
        if spec.name == "pk" {
            return Err(Error::InvalidSchema(
                "index name 'pk' is reserved for primary keys".into(),
            ));
        }
        if spec.columns.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "index {} must have at least one column",
                spec.name
            )));
        }

        let mut columns = Vec::with_capacity(spec.columns.len());
        for (table_name, column_name) in &spec.columns {
            let position = group.table_index(table_name)?;
            let (col, _) = group.table(position).get_column(column_name).ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "index {} names unknown column {column_name} in {table_name}",
                    spec.name
                ))
            })?;
            columns.push((position, col));
        }

        // The anchor is the deepest contributing table; every other
        // contributor must lie on the anchor's root path, otherwise the
        // columns don't describe one branch.
        let anchor = columns
            .iter()
            .map(|&(t, _)| t)
            .max_by_key(|&t| group.path_of(t).len())
            .expect("columns is non-empty");
        for &(t, _) in &columns {
            if !group.path_of(anchor).contains(&t) {
                return Err(Error::InvalidSchema(format!(
                    "index {} spans tables not on one branch: {} is not an ancestor of {}",
                    spec.name,
                    group.table(t).name,
                    group.table(anchor).name
                )));
            }
        }

        let anchor_name = &group.table(anchor).name;
        let tree_name = naming::generate_index_tree_name(
            &anchor_name.schema,
            &anchor_name.name,
            &spec.name,
        );
        let tree_prefix = encoding::tree_prefix(&tree_name);

        Ok(IndexDef {
            name: spec.name.clone(),
            tree_name,
            tree_prefix,
            unique: spec.unique,
            anchor,
            columns,
        })
    }

    /// `tree prefix ++ encoded values`, the probe prefix for uniqueness
    /// checks and value lookups.
    pub(crate) fn values_prefix(&self, values: &[Value]) -> Result<Vec<u8>> {
        let mut key = self.tree_prefix.clone();
        for value in values {
            encode_value(value, &mut key)?;
        }
        Ok(key)
    }

    /// Full entry key for an anchor row.
    pub(crate) fn entry_key(&self, values: &[Value], anchor_hkey: &[u8]) -> Result<Vec<u8>> {
        let mut key = self.values_prefix(values)?;
        key.extend_from_slice(anchor_hkey);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::schema::{Column, Table};
    use crate::types::value::DataType;

    fn group() -> GroupSchema {
        let customers = Table::new(
            TableName::new("test", "customers"),
            vec![
                Column::new("cid", DataType::Int),
                Column::new("name", DataType::Str),
            ],
            &["cid"],
        )
        .unwrap();
        let orders = Table::new(
            TableName::new("test", "orders"),
            vec![
                Column::new("oid", DataType::Int),
                Column::new("cid", DataType::Int),
                Column::new("placed", DataType::Date),
            ],
            &["oid"],
        )
        .unwrap()
        .with_parent(TableName::new("test", "customers"), &[("cid", "cid")])
        .unwrap();
        let shipments = Table::new(
            TableName::new("test", "shipments"),
            vec![
                Column::new("sid", DataType::Int),
                Column::new("cid", DataType::Int),
            ],
            &["sid"],
        )
        .unwrap()
        .with_parent(TableName::new("test", "customers"), &[("cid", "cid")])
        .unwrap();

        GroupSchema::build("coi", vec![customers, orders, shipments]).unwrap()
    }

    #[test]
    fn table_index_resolves_anchor() {
        let def = IndexDef::build(
            &group(),
            &IndexSpec {
                name: "by_name".into(),
                unique: false,
                columns: vec![(TableName::new("test", "customers"), "name".into())],
            },
        )
        .unwrap();
        assert_eq!(def.anchor, 0);
    }

    #[test]
    fn group_index_anchors_at_deepest_table() {
        let def = IndexDef::build(
            &group(),
            &IndexSpec {
                name: "name_placed".into(),
                unique: false,
                columns: vec![
                    (TableName::new("test", "customers"), "name".into()),
                    (TableName::new("test", "orders"), "placed".into()),
                ],
            },
        )
        .unwrap();
        assert_eq!(def.anchor, 1);
    }

    #[test]
    fn rejects_indexes_off_one_branch() {
        // Orders and shipments are siblings, not one branch.
        let err = IndexDef::build(
            &group(),
            &IndexSpec {
                name: "bad".into(),
                unique: false,
                columns: vec![
                    (TableName::new("test", "orders"), "placed".into()),
                    (TableName::new("test", "shipments"), "sid".into()),
                ],
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[test]
    fn reserved_pk_name_is_rejected() {
        let err = IndexDef::build(
            &group(),
            &IndexSpec {
                name: "pk".into(),
                unique: true,
                columns: vec![(TableName::new("test", "customers"), "name".into())],
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }
}
