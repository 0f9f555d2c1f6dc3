//! Group cursor
//!
//! Iterates one group's key region in ascending key order, which by the
//! HKey prefix property is exactly depth-first pre-order over the logical
//! forest: a parent row is immediately followed by its subtree, before any
//! sibling. The cursor pages through the backing transaction in bounded
//! `get_range` batches, resuming each page from the successor of the last
//! fetched key, so it never materializes the whole range.
//!
//! The cursor does not reshape rows; it is the primitive other
//! presentations (and the transaction-window manager) compose over.

use crate::encoding::{self, deserialize_row};
use crate::error::{Error, Result};
use crate::group::GroupSchema;
use crate::hkey::HKey;
use crate::metrics::StoreMetrics;
use crate::types::Row;
use grove_kv::Transaction;
use std::collections::VecDeque;
use std::sync::Arc;

/// A cursor over `[lower, upper)` of one group's key region.
///
/// Positioned before the first row at or past the lower bound; `next`
/// yields rows in strictly ascending HKey order until the upper bound.
/// The cursor borrows the transaction by value and hands it back from
/// [`close`](GroupCursor::close), so the caller decides the transaction's
/// fate. Reopening the same range over unmodified data reproduces an
/// identical sequence.
pub struct GroupCursor {
    txn: Transaction,
    group: Arc<GroupSchema>,
    /// Where the next page fetch starts, inclusive.
    fetch_from: Vec<u8>,
    /// Exclusive upper bound; empty means unbounded.
    upper: Vec<u8>,
    batch_size: usize,
    snapshot: bool,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    exhausted: bool,
    last_key: Option<Vec<u8>>,
    metrics: Arc<StoreMetrics>,
}

impl GroupCursor {
    pub(crate) fn open_at_keys(
        txn: Transaction,
        group: Arc<GroupSchema>,
        lower: Vec<u8>,
        upper: Vec<u8>,
        batch_size: usize,
        snapshot: bool,
        metrics: Arc<StoreMetrics>,
    ) -> Self {
        Self {
            txn,
            group,
            fetch_from: lower,
            upper,
            batch_size,
            snapshot,
            buffer: VecDeque::new(),
            exhausted: false,
            last_key: None,
            metrics,
        }
    }

    /// The next row in ascending HKey order, or `None` at the end of the
    /// range.
    pub fn next(&mut self) -> Result<Option<Row>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill()?;
        }
        let Some((key, payload)) = self.buffer.pop_front() else {
            return Ok(None);
        };

        let suffix = &key[self.group.tree_prefix().len()..];
        let hkey = HKey::decode(&self.group, suffix)?;
        let position = hkey
            .ordinal()
            .and_then(|ordinal| self.group.table_position(ordinal))
            .ok_or_else(|| Error::EncodingError {
                offset: 0,
                reason: "row key without a table segment".into(),
            })?;

        let row = Row {
            table: self.group.table(position).name.clone(),
            values: deserialize_row(&payload)?,
            hkey,
        };

        self.last_key = Some(key);
        self.metrics.scan_row();
        Ok(Some(row))
    }

    /// Release the cursor, handing its transaction back to the caller.
    pub fn close(self) -> Transaction {
        self.txn
    }

    /// Physical key of the last emitted row: the resumption marker the
    /// window manager rotates from.
    pub(crate) fn last_key(&self) -> Option<&[u8]> {
        self.last_key.as_deref()
    }

    fn fill(&mut self) -> Result<()> {
        let page = self
            .txn
            .get_range(&self.fetch_from, &self.upper, self.batch_size, self.snapshot)?;
        if page.len() < self.batch_size {
            self.exhausted = true;
        }
        if let Some((last, _)) = page.last() {
            self.fetch_from = encoding::key_after(last);
        }
        self.buffer.extend(page);
        Ok(())
    }
}
