//! Table schemas: columns, primary keys, and parent joins
//!
//! Tables are immutable after creation. A table either is a group root (no
//! parent join) or joins to its parent table through an ordered list of
//! foreign-key columns matching the parent's primary key.

use super::value::{DataType, Value};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A schema-qualified table name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A table column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name. Can't be empty.
    pub name: String,
    /// Column datatype.
    pub datatype: DataType,
    /// Whether the column allows null values. Not legal for key columns.
    pub nullable: bool,
}

impl Column {
    /// Creates a new nullable column.
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Column {
            name: name.into(),
            datatype,
            nullable: true,
        }
    }

    /// Sets whether this column is nullable.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// The join from a child table to its parent.
///
/// `child_columns` are indices into the child's column list;
/// `parent_columns` name the parent's columns and must match the parent's
/// primary key exactly, in order. Resolution against the parent happens
/// when the group is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParentJoin {
    pub parent: TableName,
    pub child_columns: Vec<usize>,
    pub parent_columns: Vec<String>,
}

/// A table schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: TableName,
    pub columns: Vec<Column>,
    /// Ordered primary-key column indices. Never empty; composite keys
    /// (including cascading, ancestor-inclusive ones) are supported.
    pub primary_key: Vec<usize>,
    /// The join to this table's parent, if it is not a group root.
    pub parent_join: Option<ParentJoin>,
}

impl Table {
    /// Creates a new table schema with the named primary-key columns.
    /// Key columns are forced non-nullable.
    pub fn new(name: TableName, columns: Vec<Column>, key: &[&str]) -> Result<Self> {
        if name.schema.is_empty() || name.name.is_empty() {
            return Err(Error::InvalidSchema("table name cannot be empty".into()));
        }
        if columns.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "table {name} must have at least one column"
            )));
        }
        if key.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "table {name} must have a primary key"
            )));
        }

        let mut columns = columns;
        let mut primary_key = Vec::with_capacity(key.len());
        for key_name in key {
            let idx = columns
                .iter()
                .position(|c| c.name == *key_name)
                .ok_or_else(|| {
                    Error::InvalidSchema(format!("unknown key column {key_name} in table {name}"))
                })?;
            if primary_key.contains(&idx) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate key column {key_name} in table {name}"
                )));
            }
            columns[idx].nullable = false;
            primary_key.push(idx);
        }

        Ok(Table {
            name,
            columns,
            primary_key,
            parent_join: None,
        })
    }

    /// Declares this table's parent join as `(child column, parent column)`
    /// pairs. The parent columns must turn out to be the parent's primary
    /// key, which is validated when the group is built.
    pub fn with_parent(mut self, parent: TableName, joins: &[(&str, &str)]) -> Result<Self> {
        if joins.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "parent join of {} must name at least one column pair",
                self.name
            )));
        }

        let mut child_columns = Vec::with_capacity(joins.len());
        let mut parent_columns = Vec::with_capacity(joins.len());
        for (child_name, parent_name) in joins {
            let (idx, _) = self.get_column(child_name).ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "unknown join column {child_name} in table {}",
                    self.name
                ))
            })?;
            self.columns[idx].nullable = false;
            child_columns.push(idx);
            parent_columns.push(parent_name.to_string());
        }

        self.parent_join = Some(ParentJoin {
            parent,
            child_columns,
            parent_columns,
        });
        Ok(self)
    }

    /// Returns the column with the given name, if it exists.
    pub fn get_column(&self, name: &str) -> Option<(usize, &Column)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == name)
    }

    /// Validates a row against this table's schema.
    pub fn validate_row(&self, values: &[Value]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::InvalidValue(format!(
                "row has {} columns, table {} has {}",
                values.len(),
                self.name,
                self.columns.len()
            )));
        }

        for (column, value) in self.columns.iter().zip(values.iter()) {
            if value.is_null() {
                if !column.nullable {
                    return Err(Error::NullConstraintViolation(column.name.clone()));
                }
            } else {
                value.check_type(&column.datatype)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_creation_resolves_keys() {
        let table = Table::new(
            TableName::new("test", "customers"),
            vec![
                Column::new("cid", DataType::Int),
                Column::new("name", DataType::Str),
            ],
            &["cid"],
        )
        .unwrap();

        assert_eq!(table.primary_key, vec![0]);
        assert!(!table.columns[0].nullable);
        assert!(table.columns[1].nullable);
    }

    #[test]
    fn table_creation_rejects_bad_keys() {
        let columns = vec![Column::new("cid", DataType::Int)];
        assert!(Table::new(TableName::new("test", "t"), columns.clone(), &[]).is_err());
        assert!(Table::new(TableName::new("test", "t"), columns.clone(), &["nope"]).is_err());
        assert!(Table::new(TableName::new("test", "t"), columns, &["cid", "cid"]).is_err());
    }

    #[test]
    fn row_validation() {
        let table = Table::new(
            TableName::new("test", "customers"),
            vec![
                Column::new("cid", DataType::Int),
                Column::new("name", DataType::Str),
            ],
            &["cid"],
        )
        .unwrap();

        assert!(table.validate_row(&[Value::Int(1), Value::string("a")]).is_ok());
        assert!(table.validate_row(&[Value::Int(1), Value::Null]).is_ok());
        assert!(table.validate_row(&[Value::Null, Value::string("a")]).is_err());
        assert!(table.validate_row(&[Value::Int(1)]).is_err());
        assert!(
            table
                .validate_row(&[Value::string("x"), Value::string("a")])
                .is_err()
        );
    }
}
