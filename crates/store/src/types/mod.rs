//! Core data model types

pub mod schema;
pub mod value;

use crate::hkey::HKey;
use schema::TableName;
use serde::{Deserialize, Serialize};
use value::Value;

/// A row yielded by scans: table identity, field values, and the derived
/// hierarchical key positioning it within its group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub table: TableName,
    pub values: Vec<Value>,
    pub hkey: HKey,
}
