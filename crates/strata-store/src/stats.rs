//! I/O counters for the store.
//!
//! Counters only ever increase (until [`IoStats::reset`]); they let callers
//! and tests confirm that an upsert touched only the partitions it had to.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters shared by the reader and writer.
#[derive(Debug, Default)]
pub struct IoStats {
    /// Partition directories discovered by listing a table.
    partitions_listed: AtomicU64,
    /// Partitions whose files were opened for reading.
    partitions_scanned: AtomicU64,
    /// Parquet files opened for reading.
    files_read: AtomicU64,
    /// Rows decoded from Parquet files.
    rows_read: AtomicU64,
    /// Parquet files written.
    files_written: AtomicU64,
    /// Partitions whose previous files were removed.
    partitions_replaced: AtomicU64,
    /// Partitions left untouched by `CreateOrSkipExisting`.
    partitions_skipped: AtomicU64,
}

/// Point-in-time copy of [`IoStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IoStatsSnapshot {
    pub partitions_listed: u64,
    pub partitions_scanned: u64,
    pub files_read: u64,
    pub rows_read: u64,
    pub files_written: u64,
    pub partitions_replaced: u64,
    pub partitions_skipped: u64,
}

impl IoStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_listed(&self, partitions: usize) {
        self.partitions_listed
            .fetch_add(partitions as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.partitions_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_file_read(&self, rows: usize) {
        self.files_read.fetch_add(1, Ordering::Relaxed);
        self.rows_read.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_file_written(&self) {
        self.files_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replaced(&self) {
        self.partitions_replaced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.partitions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IoStatsSnapshot {
        IoStatsSnapshot {
            partitions_listed: self.partitions_listed.load(Ordering::Relaxed),
            partitions_scanned: self.partitions_scanned.load(Ordering::Relaxed),
            files_read: self.files_read.load(Ordering::Relaxed),
            rows_read: self.rows_read.load(Ordering::Relaxed),
            files_written: self.files_written.load(Ordering::Relaxed),
            partitions_replaced: self.partitions_replaced.load(Ordering::Relaxed),
            partitions_skipped: self.partitions_skipped.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.partitions_listed,
            &self.partitions_scanned,
            &self.files_read,
            &self.rows_read,
            &self.files_written,
            &self.partitions_replaced,
            &self.partitions_skipped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
