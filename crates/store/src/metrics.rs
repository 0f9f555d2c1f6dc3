//! Engine metrics
//!
//! Metrics are an explicitly constructed object injected into the engine's
//! constructor and shared by reference; there is no process-wide registry.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the engine's hot paths.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    rows_written: AtomicU64,
    rows_deleted: AtomicU64,
    rows_updated: AtomicU64,
    rows_relocated: AtomicU64,
    scan_rows: AtomicU64,
    scan_windows: AtomicU64,
    scan_rotations: AtomicU64,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rows_written: u64,
    pub rows_deleted: u64,
    pub rows_updated: u64,
    pub rows_relocated: u64,
    pub scan_rows: u64,
    pub scan_windows: u64,
    pub scan_rotations: u64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_written: self.rows_written.load(Ordering::Relaxed),
            rows_deleted: self.rows_deleted.load(Ordering::Relaxed),
            rows_updated: self.rows_updated.load(Ordering::Relaxed),
            rows_relocated: self.rows_relocated.load(Ordering::Relaxed),
            scan_rows: self.scan_rows.load(Ordering::Relaxed),
            scan_windows: self.scan_windows.load(Ordering::Relaxed),
            scan_rotations: self.scan_rotations.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn row_written(&self) {
        self.rows_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn row_deleted(&self) {
        self.rows_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn row_updated(&self) {
        self.rows_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rows_relocated(&self, count: u64) {
        self.rows_relocated.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn scan_row(&self) {
        self.scan_rows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn scan_window(&self) {
        self.scan_windows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn scan_rotation(&self) {
        self.scan_rotations.fetch_add(1, Ordering::Relaxed);
    }
}
