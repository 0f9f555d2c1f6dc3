//! Binary codecs for keys and row payloads
//!
//! This module provides two kinds of encoding:
//! 1. Key values - order-preserving, prefix-free encoding for anything that
//!    lands in the ordered key space
//! 2. Row payloads - compact serde encoding for stored field values
//!
//! # Key ordering
//!
//! Every key value starts with a single type tag, so the cross-type order
//! is fixed by tag value and documented here:
//!
//! NULL < Bool < Int < Float < Decimal < Str < Bytes < Uuid < Date <
//! Timestamp < no-ancestor marker
//!
//! Within a type, ascending byte order reproduces ascending domain order:
//! integers and epoch days are sign-flipped big-endian, floats use the
//! sign-fold trick (negative values bit-complemented), decimals encode
//! their floor plus a fixed 28-digit fraction, and strings/bytes escape
//! interior 0x00 bytes and close with a 0x00 0x00 terminator. The
//! terminator makes variable-length values prefix-free: no valid encoding
//! is a strict prefix of a different value's encoding, so decoding and
//! range boundaries stay unambiguous.

use crate::error::{Error, Result};
use crate::hkey::KeyValue;
use crate::types::value::Value;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

pub(crate) const TAG_NULL: u8 = 0x01;
pub(crate) const TAG_BOOL: u8 = 0x02;
pub(crate) const TAG_INT: u8 = 0x03;
pub(crate) const TAG_FLOAT: u8 = 0x04;
pub(crate) const TAG_DECIMAL: u8 = 0x05;
pub(crate) const TAG_STR: u8 = 0x06;
pub(crate) const TAG_BYTES: u8 = 0x07;
pub(crate) const TAG_UUID: u8 = 0x08;
pub(crate) const TAG_DATE: u8 = 0x09;
pub(crate) const TAG_TIMESTAMP: u8 = 0x0A;
/// Reserved segment value for a child whose ancestor key is unresolvable.
/// Sorts after every real value, so orphan subtrees cluster at the end of
/// their ordinal's range.
pub(crate) const TAG_NO_ANCESTOR: u8 = 0xE0;

/// Days between 0001-01-01 (chrono's day 1) and the Unix epoch.
const EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// Number of fraction digits carried by the decimal key encoding.
const DECIMAL_FRACTION_DIGITS: u32 = 28;

// ============================================================================
// Key Value Encoding (Order-Preserving)
// ============================================================================

fn order_i64(i: i64) -> [u8; 8] {
    ((i as u64) ^ (1u64 << 63)).to_be_bytes()
}

fn unorder_i64(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ (1u64 << 63)) as i64
}

fn order_i128(i: i128) -> [u8; 16] {
    ((i as u128) ^ (1u128 << 127)).to_be_bytes()
}

fn unorder_i128(bytes: [u8; 16]) -> i128 {
    (u128::from_be_bytes(bytes) ^ (1u128 << 127)) as i128
}

fn order_f64(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    let sortable = if f.is_sign_negative() {
        !bits
    } else {
        bits ^ (1u64 << 63)
    };
    sortable.to_be_bytes()
}

fn unorder_f64(bytes: [u8; 8]) -> f64 {
    let bits = u64::from_be_bytes(bytes);
    if bits & (1u64 << 63) != 0 {
        f64::from_bits(bits ^ (1u64 << 63))
    } else {
        f64::from_bits(!bits)
    }
}

/// Encode one value in order-preserving form.
pub fn encode_value(value: &Value, output: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Null => {
            output.push(TAG_NULL);
        }
        Value::Bool(b) => {
            output.push(TAG_BOOL);
            output.push(if *b { 1 } else { 0 });
        }
        Value::Int(i) => {
            output.push(TAG_INT);
            output.extend_from_slice(&order_i64(*i));
        }
        Value::Float(f) => {
            output.push(TAG_FLOAT);
            output.extend_from_slice(&order_f64(*f));
        }
        Value::Decimal(d) => {
            output.push(TAG_DECIMAL);
            encode_decimal(d, output)?;
        }
        Value::Str(s) => {
            output.push(TAG_STR);
            push_escaped(s.as_bytes(), output);
        }
        Value::Bytes(b) => {
            output.push(TAG_BYTES);
            push_escaped(b, output);
        }
        Value::Uuid(u) => {
            output.push(TAG_UUID);
            output.extend_from_slice(u.as_bytes());
        }
        Value::Date(d) => {
            output.push(TAG_DATE);
            let days = i64::from(d.num_days_from_ce()) - EPOCH_DAYS_FROM_CE;
            output.extend_from_slice(&order_i64(days));
        }
        Value::Timestamp(ts) => {
            output.push(TAG_TIMESTAMP);
            let utc = ts.and_utc();
            output.extend_from_slice(&order_i64(utc.timestamp()));
            output.extend_from_slice(&utc.timestamp_subsec_nanos().to_be_bytes());
        }
    }
    Ok(())
}

/// Encode a key value: either a real value or the no-ancestor marker.
pub fn encode_key_value(value: &KeyValue, output: &mut Vec<u8>) -> Result<()> {
    match value {
        KeyValue::NoAncestor => {
            output.push(TAG_NO_ANCESTOR);
            Ok(())
        }
        KeyValue::Value(v) => encode_value(v, output),
    }
}

/// Decimals encode as floor (sign-flipped i128) followed by the fraction
/// scaled to a fixed 28 digits. Using floor rather than truncation keeps
/// the fraction non-negative, so the pair compares like the number.
fn encode_decimal(d: &Decimal, output: &mut Vec<u8>) -> Result<()> {
    let floor = d.floor();
    let int = floor
        .to_i128()
        .ok_or_else(|| Error::InvalidValue(format!("decimal {d} outside key range")))?;
    let frac = *d - floor;
    let frac_scaled =
        (frac.mantissa() as u128) * 10u128.pow(DECIMAL_FRACTION_DIGITS - frac.scale());

    output.extend_from_slice(&order_i128(int));
    output.extend_from_slice(&frac_scaled.to_be_bytes());
    Ok(())
}

fn decode_decimal(bytes: &[u8], pos: &mut usize) -> Result<Decimal> {
    let offset = *pos;
    let int_bytes: [u8; 16] = take(bytes, pos, 16)?
        .try_into()
        .map_err(|_| truncated(offset))?;
    let frac_bytes: [u8; 16] = take(bytes, pos, 16)?
        .try_into()
        .map_err(|_| truncated(offset))?;

    let int = unorder_i128(int_bytes);
    let frac_scaled = u128::from_be_bytes(frac_bytes);
    if frac_scaled >= 10u128.pow(DECIMAL_FRACTION_DIGITS) {
        return Err(Error::EncodingError {
            offset,
            reason: "decimal fraction out of range".into(),
        });
    }

    let int_part = Decimal::try_from_i128_with_scale(int, 0).map_err(|e| Error::EncodingError {
        offset,
        reason: format!("decimal integer part: {e}"),
    })?;
    let frac_part = Decimal::try_from_i128_with_scale(frac_scaled as i128, DECIMAL_FRACTION_DIGITS)
        .map_err(|e| Error::EncodingError {
            offset,
            reason: format!("decimal fraction: {e}"),
        })?
        .normalize();

    int_part.checked_add(frac_part).ok_or(Error::EncodingError {
        offset,
        reason: "decimal out of range".into(),
    })
}

/// Escape 0x00 as 0x00 0xFF and close with the 0x00 0x00 terminator.
fn push_escaped(bytes: &[u8], output: &mut Vec<u8>) {
    for &b in bytes {
        if b == 0x00 {
            output.push(0x00);
            output.push(0xFF);
        } else {
            output.push(b);
        }
    }
    output.push(0x00);
    output.push(0x00);
}

fn decode_escaped(bytes: &[u8], pos: &mut usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let offset = *pos;
        let b = *bytes.get(*pos).ok_or_else(|| truncated(offset))?;
        if b != 0x00 {
            out.push(b);
            *pos += 1;
            continue;
        }
        let next = *bytes.get(*pos + 1).ok_or_else(|| truncated(offset))?;
        *pos += 2;
        match next {
            0x00 => return Ok(out),
            0xFF => out.push(0x00),
            other => {
                return Err(Error::EncodingError {
                    offset: offset + 1,
                    reason: format!("invalid escape byte {other:#04x}"),
                });
            }
        }
    }
}

fn truncated(offset: usize) -> Error {
    Error::EncodingError {
        offset,
        reason: "truncated key".into(),
    }
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    if *pos + n > bytes.len() {
        return Err(truncated(*pos));
    }
    let slice = &bytes[*pos..*pos + n];
    *pos += n;
    Ok(slice)
}

/// Decode one key value starting at `*pos`, advancing it past the value.
pub fn decode_key_value(bytes: &[u8], pos: &mut usize) -> Result<KeyValue> {
    let offset = *pos;
    let tag = *bytes.get(*pos).ok_or_else(|| truncated(offset))?;
    *pos += 1;

    let value = match tag {
        TAG_NO_ANCESTOR => return Ok(KeyValue::NoAncestor),
        TAG_NULL => Value::Null,
        TAG_BOOL => {
            let b = take(bytes, pos, 1)?[0];
            Value::Bool(b != 0)
        }
        TAG_INT => {
            let raw: [u8; 8] = take(bytes, pos, 8)?
                .try_into()
                .map_err(|_| truncated(offset))?;
            Value::Int(unorder_i64(raw))
        }
        TAG_FLOAT => {
            let raw: [u8; 8] = take(bytes, pos, 8)?
                .try_into()
                .map_err(|_| truncated(offset))?;
            Value::Float(unorder_f64(raw))
        }
        TAG_DECIMAL => Value::Decimal(decode_decimal(bytes, pos)?),
        TAG_STR => {
            let raw = decode_escaped(bytes, pos)?;
            Value::Str(String::from_utf8(raw).map_err(|e| Error::EncodingError {
                offset,
                reason: format!("invalid UTF-8: {e}"),
            })?)
        }
        TAG_BYTES => Value::Bytes(decode_escaped(bytes, pos)?),
        TAG_UUID => {
            let raw: [u8; 16] = take(bytes, pos, 16)?
                .try_into()
                .map_err(|_| truncated(offset))?;
            Value::Uuid(Uuid::from_bytes(raw))
        }
        TAG_DATE => {
            let raw: [u8; 8] = take(bytes, pos, 8)?
                .try_into()
                .map_err(|_| truncated(offset))?;
            let days = unorder_i64(raw) + EPOCH_DAYS_FROM_CE;
            let days = i32::try_from(days).map_err(|_| Error::EncodingError {
                offset,
                reason: "date out of range".into(),
            })?;
            Value::Date(NaiveDate::from_num_days_from_ce_opt(days).ok_or(
                Error::EncodingError {
                    offset,
                    reason: "date out of range".into(),
                },
            )?)
        }
        TAG_TIMESTAMP => {
            let secs_raw: [u8; 8] = take(bytes, pos, 8)?
                .try_into()
                .map_err(|_| truncated(offset))?;
            let nanos_raw: [u8; 4] = take(bytes, pos, 4)?
                .try_into()
                .map_err(|_| truncated(offset))?;
            let secs = unorder_i64(secs_raw);
            let nanos = u32::from_be_bytes(nanos_raw);
            let ts = chrono::DateTime::from_timestamp(secs, nanos).ok_or(Error::EncodingError {
                offset,
                reason: "timestamp out of range".into(),
            })?;
            Value::Timestamp(ts.naive_utc())
        }
        unknown => {
            return Err(Error::EncodingError {
                offset,
                reason: format!("unknown type tag {unknown:#04x}"),
            });
        }
    };

    Ok(KeyValue::Value(value))
}

// ============================================================================
// Row Payload Encoding
// ============================================================================

/// Serialize a row's field values for storage.
pub fn serialize_row(values: &[Value]) -> Result<Vec<u8>> {
    bincode::serialize(values).map_err(|e| Error::Serialization(e.to_string()))
}

/// Deserialize a row's field values from storage.
pub fn deserialize_row(bytes: &[u8]) -> Result<Vec<Value>> {
    bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
}

// ============================================================================
// Key Construction
// ============================================================================

/// Key prefix for a named tree: length byte followed by the name.
/// Tree names are bounded by `naming::MAX_TREE_NAME_LENGTH`, so one byte
/// always suffices.
pub fn tree_prefix(tree_name: &str) -> Vec<u8> {
    let bytes = tree_name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
    out
}

/// Smallest key strictly greater than `key` itself but not greater than any
/// of its extensions: used as an inclusive resume bound that skips the key
/// while keeping its descendants.
pub fn key_after(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.extend_from_slice(key);
    out.push(0x00);
    out
}

/// Exclusive upper bound covering every key that starts with `prefix`.
/// Returns an empty vector when no finite bound exists (all-0xFF prefix),
/// which the store treats as unbounded.
pub fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(&last) = end.last() {
        if last == 0xFF {
            end.pop();
        } else {
            let idx = end.len() - 1;
            end[idx] += 1;
            return end;
        }
    }
    Vec::new()
}
