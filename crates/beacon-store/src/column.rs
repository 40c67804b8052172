//! Wide-column client surface
//!
//! The registry persists announcements in one column family of a
//! wide-column store. This module defines the narrow client API the store
//! needs; [`crate::memory`] and [`crate::durable`] implement it.

use async_trait::async_trait;
use beacon_common::Result;

/// A single stored column.
///
/// `name` is the absolute expiration timestamp in epoch milliseconds,
/// `value` the encoded service list, and `timestamp` the write time used
/// for last-writer-wins reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: u64,
    pub value: String,
    pub timestamp: u64,
}

/// One row of a scan page: the row key and its column slice.
#[derive(Clone, Debug)]
pub struct RowColumns {
    pub key: String,
    pub columns: Vec<Column>,
}

/// Client handle to one column family of the backing wide-column store.
///
/// Writes reconcile last-writer-wins on `(row, name)` by `timestamp`; equal
/// timestamps resolve to the lexicographically larger value. Deletions are
/// timestamped tombstones: a write at or before a tombstone's timestamp
/// stays dead (the column family runs with a tombstone grace of zero, so
/// deleted cells must never resurrect).
///
/// Every call may block on I/O to the backing cluster; callers should
/// assume latencies of tens of milliseconds.
#[async_trait]
pub trait ColumnFamily: Send + Sync {
    /// Insert one column into a row.
    async fn insert(&self, row_key: &str, column: Column) -> Result<()>;

    /// Columns of one row with name in the inclusive range `[min, max]`,
    /// ordered by name ascending, or descending when `reverse`. At most
    /// `limit` columns are returned.
    async fn slice(
        &self,
        row_key: &str,
        min: Option<u64>,
        max: Option<u64>,
        reverse: bool,
        limit: usize,
    ) -> Result<Vec<Column>>;

    /// One page of rows in key order, strictly after `start_after`.
    ///
    /// Each row carries its column slice for the same name range as
    /// [`slice`](Self::slice). Rows are returned in key order regardless of
    /// whether any column matches the range; a non-matching row carries an
    /// empty slice. Paging with "full page means more rows may follow"
    /// relies on this.
    async fn scan(
        &self,
        start_after: Option<&str>,
        min: Option<u64>,
        max: Option<u64>,
        reverse: bool,
        page_size: usize,
    ) -> Result<Vec<RowColumns>>;

    /// Tombstone a whole row at `timestamp_ms`.
    async fn delete_row(&self, row_key: &str, timestamp_ms: u64) -> Result<()>;

    /// Tombstone the named columns of a row at `timestamp_ms`.
    async fn delete_columns(&self, row_key: &str, names: &[u64], timestamp_ms: u64) -> Result<()>;
}
