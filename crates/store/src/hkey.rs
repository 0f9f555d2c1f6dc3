//! Hierarchical keys
//!
//! An HKey positions a row inside its group's key space as an ordered list
//! of segments, one per ancestor level from the group root down to the
//! row's own table. Each segment carries the table's ordinal and the key
//! column values that table contributes. Because a parent's encoded HKey is
//! a strict byte prefix of every descendant's encoded HKey, ascending key
//! order over a group tree is exactly a depth-first pre-order traversal of
//! the logical forest: a row's children immediately follow it, before any
//! sibling subtree.
//!
//! HKeys are a pure function of a row's own key columns and its ancestors'
//! segments; they are recomputed, never stored in payloads.

use crate::encoding::{decode_key_value, encode_key_value};
use crate::error::{Error, Result};
use crate::group::GroupSchema;
use crate::types::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One position's worth of key material: a real value, or the reserved
/// no-ancestor marker standing in for an unresolvable ancestor key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum KeyValue {
    NoAncestor,
    Value(Value),
}

/// One level of an HKey: the table's ordinal plus the key column values
/// that table contributes at this level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HKeySegment {
    pub ordinal: u16,
    pub values: Vec<KeyValue>,
}

/// A row's position within its group's key space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HKey {
    pub segments: Vec<HKeySegment>,
}

impl HKey {
    pub fn new(segments: Vec<HKeySegment>) -> Self {
        Self { segments }
    }

    /// Number of ancestor levels, the row's own included.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The ordinal of the row's own table.
    pub fn ordinal(&self) -> Option<u16> {
        self.segments.last().map(|s| s.ordinal)
    }

    /// Encode to the ordered byte form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for segment in &self.segments {
            out.extend_from_slice(&segment.ordinal.to_be_bytes());
            for value in &segment.values {
                encode_key_value(value, &mut out)?;
            }
        }
        Ok(out)
    }

    /// Decode an HKey of arbitrary depth. Segment widths and the
    /// parent/child chain are resolved through the group schema; malformed
    /// bytes report the offending offset.
    pub fn decode(group: &GroupSchema, bytes: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let mut segments = Vec::new();
        let mut previous: Option<usize> = None;

        while pos < bytes.len() {
            let segment_offset = pos;
            if pos + 2 > bytes.len() {
                return Err(Error::EncodingError {
                    offset: segment_offset,
                    reason: "truncated segment ordinal".into(),
                });
            }
            let ordinal = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]);
            pos += 2;

            let table = group
                .table_position(ordinal)
                .ok_or_else(|| Error::EncodingError {
                    offset: segment_offset,
                    reason: format!("unknown table ordinal {ordinal}"),
                })?;

            let chain_ok = match previous {
                None => table == group.root(),
                Some(parent) => group.parent_of(table) == Some(parent),
            };
            if !chain_ok {
                return Err(Error::EncodingError {
                    offset: segment_offset,
                    reason: format!(
                        "segment for {} breaks the group's ancestor chain",
                        group.table(table).name
                    ),
                });
            }

            let width = group.segment_width(table);
            let mut values = Vec::with_capacity(width);
            for _ in 0..width {
                values.push(decode_key_value(bytes, &mut pos)?);
            }

            segments.push(HKeySegment { ordinal, values });
            previous = Some(table);
        }

        if segments.is_empty() {
            return Err(Error::EncodingError {
                offset: 0,
                reason: "empty hkey".into(),
            });
        }

        Ok(HKey { segments })
    }

    /// The HKey produced by replacing this key's leading segments with a
    /// relocated ancestor's new key, keeping the tail below it untouched.
    pub fn rebase(&self, ancestor_depth: usize, new_ancestor: &HKey) -> HKey {
        let mut segments = new_ancestor.segments.clone();
        segments.extend_from_slice(&self.segments[ancestor_depth..]);
        HKey { segments }
    }

    /// The HKey truncated to its first `depth` segments.
    pub fn ancestor(&self, depth: usize) -> HKey {
        HKey {
            segments: self.segments[..depth].to_vec(),
        }
    }
}

impl fmt::Display for HKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}:[", segment.ordinal)?;
            for (j, value) in segment.values.iter().enumerate() {
                if j > 0 {
                    write!(f, ",")?;
                }
                match value {
                    KeyValue::NoAncestor => write!(f, "?")?,
                    KeyValue::Value(v) => write!(f, "{v}")?,
                }
            }
            write!(f, "]")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::schema::{Column, Table, TableName};
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
            ],
            &["oid"],
        )
        .unwrap()
        .with_parent(TableName::new("test", "customers"), &[("cid", "cid")])
        .unwrap();
        let items = Table::new(
            TableName::new("test", "items"),
            vec![
                Column::new("iid", DataType::Int),
                Column::new("oid", DataType::Int),
            ],
            &["iid"],
        )
        .unwrap()
        .with_parent(TableName::new("test", "orders"), &[("oid", "oid")])
        .unwrap();

        GroupSchema::build("coi", vec![customers, orders, items]).unwrap()
    }

    fn segment(ordinal: u16, values: Vec<KeyValue>) -> HKeySegment {
        HKeySegment { ordinal, values }
    }

    fn int(i: i64) -> KeyValue {
        KeyValue::Value(Value::Int(i))
    }

    #[test]
    fn roundtrip_at_every_depth() {
        let group = group();
        let item = HKey::new(vec![
            segment(1, vec![int(2)]),
            segment(2, vec![int(22)]),
            segment(3, vec![int(222)]),
        ]);

        for depth in 1..=3 {
            let hkey = item.ancestor(depth);
            let decoded = HKey::decode(&group, &hkey.encode().unwrap()).unwrap();
            assert_eq!(decoded, hkey);
        }
    }

    #[test]
    fn roundtrip_with_orphan_marker() {
        let group = group();
        let orphan = HKey::new(vec![
            segment(1, vec![KeyValue::NoAncestor]),
            segment(2, vec![int(99)]),
            segment(3, vec![int(990)]),
        ]);
        let decoded = HKey::decode(&group, &orphan.encode().unwrap()).unwrap();
        assert_eq!(decoded, orphan);
    }

    #[test]
    fn parent_key_prefixes_descendants() {
        let order = HKey::new(vec![segment(1, vec![int(2)]), segment(2, vec![int(22)])]);
        let item = HKey::new(vec![
            segment(1, vec![int(2)]),
            segment(2, vec![int(22)]),
            segment(3, vec![int(221)]),
        ]);
        let order_bytes = order.encode().unwrap();
        let item_bytes = item.encode().unwrap();
        assert!(item_bytes.starts_with(&order_bytes));
    }

    #[test]
    fn rebase_splices_new_ancestor_segments() {
        let item = HKey::new(vec![
            segment(1, vec![int(2)]),
            segment(2, vec![int(22)]),
            segment(3, vec![int(221)]),
        ]);
        let new_order = HKey::new(vec![segment(1, vec![int(2)]), segment(2, vec![int(95)])]);

        let rebased = item.rebase(2, &new_order);
        assert_eq!(
            rebased,
            HKey::new(vec![
                segment(1, vec![int(2)]),
                segment(2, vec![int(95)]),
                segment(3, vec![int(221)]),
            ])
        );
    }

    #[test]
    fn malformed_bytes_report_offsets() {
        let group = group();

        // Unknown ordinal.
        let bad = HKey::new(vec![segment(9, vec![int(1)])]).encode().unwrap();
        let err = HKey::decode(&group, &bad).unwrap_err();
        assert!(matches!(err, Error::EncodingError { offset: 0, .. }));

        // Segment chain violation: items directly under the root.
        let bad = HKey::new(vec![segment(1, vec![int(1)]), segment(3, vec![int(1)])])
            .encode()
            .unwrap();
        let err = HKey::decode(&group, &bad).unwrap_err();
        assert!(matches!(err, Error::EncodingError { .. }));

        // Truncated segment.
        let mut bytes = HKey::new(vec![segment(1, vec![int(1)])]).encode().unwrap();
        bytes.truncate(bytes.len() - 3);
        let err = HKey::decode(&group, &bytes).unwrap_err();
        assert!(matches!(err, Error::EncodingError { .. }));

        // Empty input.
        let err = HKey::decode(&group, &[]).unwrap_err();
        assert!(matches!(err, Error::EncodingError { offset: 0, .. }));
    }
}
