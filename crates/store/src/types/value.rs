//! Column values and data types
//!
//! The value domain is restricted to types with a total, order-preserving
//! key encoding (see `encoding`), since any column may contribute to an
//! HKey.

use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A column value
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Str(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

/// Data types for column definitions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int,
    Float,
    Decimal,
    Str,
    Bytes,
    Uuid,
    Date,
    Timestamp,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Create an Int value
    pub fn integer(i: i64) -> Self {
        Value::Int(i)
    }

    /// Create a Str value
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// The data type of this value, if it has one (NULL does not).
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(DataType::Bool),
            Value::Int(_) => Some(DataType::Int),
            Value::Float(_) => Some(DataType::Float),
            Value::Decimal(_) => Some(DataType::Decimal),
            Value::Str(_) => Some(DataType::Str),
            Value::Bytes(_) => Some(DataType::Bytes),
            Value::Uuid(_) => Some(DataType::Uuid),
            Value::Date(_) => Some(DataType::Date),
            Value::Timestamp(_) => Some(DataType::Timestamp),
        }
    }

    /// Validates that this value matches the given data type.
    pub fn check_type(&self, datatype: &DataType) -> Result<()> {
        match self.data_type() {
            None => Ok(()),
            Some(dt) if dt == *datatype => Ok(()),
            Some(dt) => Err(Error::InvalidValue(format!(
                "expected {datatype}, found {dt}"
            ))),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Decimal(d) => write!(f, "Decimal({d})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Bytes(b) => write!(f, "Bytes({b:02x?})"),
            Value::Uuid(u) => write!(f, "Uuid({u})"),
            Value::Date(d) => write!(f, "Date({d})"),
            Value::Timestamp(t) => write!(f, "Timestamp({t})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "x{b:02x?}"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Timestamp(t) => write!(f, "{t}"),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "BOOL",
            DataType::Int => "INT",
            DataType::Float => "FLOAT",
            DataType::Decimal => "DECIMAL",
            DataType::Str => "STRING",
            DataType::Bytes => "BYTES",
            DataType::Uuid => "UUID",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMP",
        };
        write!(f, "{name}")
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_type_accepts_null_and_matching_types() {
        assert!(Value::Null.check_type(&DataType::Int).is_ok());
        assert!(Value::Int(7).check_type(&DataType::Int).is_ok());
        assert!(Value::Str("x".into()).check_type(&DataType::Str).is_ok());
        assert!(Value::Int(7).check_type(&DataType::Str).is_err());
    }
}
