//! Transaction-window manager
//!
//! The backing store bounds how much one transaction should serve, so a
//! windowed scan stitches a sequence of short-lived backing transactions
//! into one logically gapless, duplicate-free ordered row stream. Each
//! window serves at most `row_limit` rows and `time_limit_ms` of wall
//! clock; hitting either limit records the last emitted row's physical key
//! as the resumption marker, ends the backing transaction, begins a new
//! one, and reopens the cursor just past the marker.
//!
//! For unmodified data, the emitted sequence is byte-identical to a single
//! unbounded-transaction scan, whatever the limits and mode, and
//! independently configured concurrent scans never perturb each other.

use crate::cursor::GroupCursor;
use crate::encoding;
use crate::error::{Error, Result};
use crate::group::GroupSchema;
use crate::metrics::StoreMetrics;
use crate::types::Row;
use grove_kv::TransactStore;
use std::sync::Arc;
use std::time::Instant;

/// How a scan's sub-transactions read the shared key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Every sub-transaction reads the consistent view as of its own open,
    /// ignoring commits that land elsewhere while it serves.
    Snapshot,
    /// Reads the latest committed state. A cursor driven inside a caller's
    /// own transaction (see [`crate::GroupStore::open_cursor`]) additionally
    /// observes that transaction's uncommitted writes.
    Live,
}

/// Limits governing how much one backing transaction may serve before the
/// scan rotates to a new one. Both limits are independent and optional.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Rows one window may emit; −1 means unlimited.
    pub row_limit: i64,
    /// Wall-clock milliseconds one window may serve; −1 means unlimited.
    pub time_limit_ms: i64,
    pub mode: ScanMode,
}

impl ScanOptions {
    /// No limits: the whole scan runs in one backing transaction.
    pub fn unlimited(mode: ScanMode) -> Self {
        Self {
            row_limit: -1,
            time_limit_ms: -1,
            mode,
        }
    }

    pub fn with_row_limit(mut self, row_limit: i64) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn with_time_limit_ms(mut self, time_limit_ms: i64) -> Self {
        self.time_limit_ms = time_limit_ms;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (name, limit) in [
            ("row_limit", self.row_limit),
            ("time_limit_ms", self.time_limit_ms),
        ] {
            if limit < -1 || limit == 0 {
                return Err(Error::ConfigurationError(format!(
                    "{name} must be positive, or -1 for unlimited, got {limit}"
                )));
            }
        }
        Ok(())
    }
}

/// A windowed scan over one group range.
///
/// The scan owns its backing sub-transactions; reaching a configured limit
/// mid-scan is a rotation event, not an error. A sub-transaction commit
/// failing with a conflict is surfaced as retryable: the scan stays
/// positioned at the marker, so calling [`next`](GroupScan::next) again
/// after such a failure resumes without a gap or a duplicate.
pub struct GroupScan {
    kv: TransactStore,
    group: Arc<GroupSchema>,
    options: ScanOptions,
    batch_size: usize,
    metrics: Arc<StoreMetrics>,
    /// Where the next window resumes, inclusive. Advanced to the successor
    /// of each emitted row's key, which skips that row but keeps its
    /// descendants in range.
    lower: Vec<u8>,
    upper: Vec<u8>,
    cursor: Option<GroupCursor>,
    window_rows: i64,
    window_opened: Instant,
    finished: bool,
}

impl GroupScan {
    pub(crate) fn new(
        kv: TransactStore,
        group: Arc<GroupSchema>,
        lower: Vec<u8>,
        upper: Vec<u8>,
        options: ScanOptions,
        batch_size: usize,
        metrics: Arc<StoreMetrics>,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            kv,
            group,
            options,
            batch_size,
            metrics,
            lower,
            upper,
            cursor: None,
            window_rows: 0,
            window_opened: Instant::now(),
            finished: false,
        })
    }

    /// The next row of the logical scan, rotating the backing transaction
    /// as the configured limits require.
    pub fn next(&mut self) -> Result<Option<Row>> {
        if self.finished {
            return Ok(None);
        }
        if self.cursor.is_some() && self.window_full() {
            self.end_window()?;
            self.metrics.scan_rotation();
            tracing::debug!(group = self.group.name(), "rotated scan window");
        }
        if self.cursor.is_none() {
            self.open_window();
        }

        let cursor = self.cursor.as_mut().expect("window opened above");
        match cursor.next()? {
            Some(row) => {
                self.window_rows += 1;
                if let Some(key) = cursor.last_key() {
                    self.lower = encoding::key_after(key);
                }
                Ok(Some(row))
            }
            None => {
                self.finished = true;
                self.end_window()?;
                Ok(None)
            }
        }
    }

    /// Release the current backing transaction promptly and end the scan.
    pub fn close(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            cursor.close().rollback();
        }
        self.finished = true;
    }

    fn window_full(&self) -> bool {
        (self.options.row_limit != -1 && self.window_rows >= self.options.row_limit)
            || (self.options.time_limit_ms != -1
                && self.window_opened.elapsed().as_millis() >= self.options.time_limit_ms as u128)
    }

    fn open_window(&mut self) {
        let txn = self.kv.begin();
        self.cursor = Some(GroupCursor::open_at_keys(
            txn,
            self.group.clone(),
            self.lower.clone(),
            self.upper.clone(),
            self.batch_size,
            self.options.mode == ScanMode::Snapshot,
            self.metrics.clone(),
        ));
        self.window_rows = 0;
        self.window_opened = Instant::now();
        self.metrics.scan_window();
    }

    /// End the current backing transaction. Live windows commit, keeping
    /// anything they touched durably visible; snapshot windows are
    /// non-mutating and simply discard. On a commit conflict the scan is
    /// still positioned at the marker, never past unconfirmed rows.
    fn end_window(&mut self) -> Result<()> {
        let Some(cursor) = self.cursor.take() else {
            return Ok(());
        };
        let txn = cursor.close();
        match self.options.mode {
            ScanMode::Live => txn.commit()?,
            ScanMode::Snapshot => txn.rollback(),
        }
        Ok(())
    }
}

impl Iterator for GroupScan {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        GroupScan::next(self).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_validation() {
        assert!(ScanOptions::unlimited(ScanMode::Live).validate().is_ok());
        assert!(
            ScanOptions::unlimited(ScanMode::Snapshot)
                .with_row_limit(1)
                .with_time_limit_ms(2)
                .validate()
                .is_ok()
        );

        for bad in [0, -2] {
            let err = ScanOptions::unlimited(ScanMode::Live)
                .with_row_limit(bad)
                .validate()
                .unwrap_err();
            assert!(matches!(err, Error::ConfigurationError(_)));

            let err = ScanOptions::unlimited(ScanMode::Live)
                .with_time_limit_ms(bad)
                .validate()
                .unwrap_err();
            assert!(matches!(err, Error::ConfigurationError(_)));
        }
    }
}
