//! In-memory column family
//!
//! Implements the full reconciliation semantics of the backing store
//! (last-writer-wins cells, timestamped row and column tombstones) so the
//! dynamic store behaves identically against memory and disk. Used by the
//! `memory` backend and throughout the tests.

use crate::column::{Column, ColumnFamily, RowColumns};
use async_trait::async_trait;
use beacon_common::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

#[derive(Clone, Debug)]
struct Cell {
    value: String,
    timestamp: u64,
}

#[derive(Debug, Default)]
struct Row {
    cells: BTreeMap<u64, Cell>,
    column_tombstones: BTreeMap<u64, u64>,
    row_tombstone: u64,
}

impl Row {
    fn tombstone_for(&self, name: u64) -> u64 {
        let column = self.column_tombstones.get(&name).copied().unwrap_or(0);
        self.row_tombstone.max(column)
    }

    fn apply_insert(&mut self, name: u64, cell: Cell) {
        if cell.timestamp <= self.tombstone_for(name) {
            return;
        }
        match self.cells.get(&name) {
            Some(existing)
                if existing.timestamp > cell.timestamp
                    || (existing.timestamp == cell.timestamp && existing.value >= cell.value) => {}
            _ => {
                self.cells.insert(name, cell);
            }
        }
    }

    fn apply_column_tombstone(&mut self, name: u64, timestamp: u64) {
        let entry = self.column_tombstones.entry(name).or_insert(0);
        *entry = (*entry).max(timestamp);
        if let Some(cell) = self.cells.get(&name) {
            if cell.timestamp <= timestamp {
                self.cells.remove(&name);
            }
        }
    }

    fn apply_row_tombstone(&mut self, timestamp: u64) {
        self.row_tombstone = self.row_tombstone.max(timestamp);
        self.cells.retain(|_, cell| cell.timestamp > timestamp);
    }

    fn slice(&self, min: Option<u64>, max: Option<u64>, reverse: bool, limit: usize) -> Vec<Column> {
        let lo = min.unwrap_or(0);
        let hi = max.unwrap_or(u64::MAX);
        if lo > hi {
            return Vec::new();
        }
        let mut columns: Vec<Column> = self
            .cells
            .range(lo..=hi)
            .map(|(name, cell)| Column {
                name: *name,
                value: cell.value.clone(),
                timestamp: cell.timestamp,
            })
            .collect();
        if reverse {
            columns.reverse();
        }
        columns.truncate(limit);
        columns
    }
}

/// Volatile column family held entirely in process memory.
#[derive(Default)]
pub struct MemoryColumnFamily {
    rows: RwLock<BTreeMap<String, Row>>,
}

impl MemoryColumnFamily {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ColumnFamily for MemoryColumnFamily {
    async fn insert(&self, row_key: &str, column: Column) -> Result<()> {
        let mut rows = self.rows.write();
        rows.entry(row_key.to_string()).or_default().apply_insert(
            column.name,
            Cell {
                value: column.value,
                timestamp: column.timestamp,
            },
        );
        Ok(())
    }

    async fn slice(
        &self,
        row_key: &str,
        min: Option<u64>,
        max: Option<u64>,
        reverse: bool,
        limit: usize,
    ) -> Result<Vec<Column>> {
        let rows = self.rows.read();
        Ok(rows
            .get(row_key)
            .map(|row| row.slice(min, max, reverse, limit))
            .unwrap_or_default())
    }

    async fn scan(
        &self,
        start_after: Option<&str>,
        min: Option<u64>,
        max: Option<u64>,
        reverse: bool,
        page_size: usize,
    ) -> Result<Vec<RowColumns>> {
        let rows = self.rows.read();
        let lower = match start_after {
            Some(key) => Excluded(key),
            None => Unbounded,
        };
        Ok(rows
            .range::<str, _>((lower, Unbounded))
            .take(page_size)
            .map(|(key, row)| RowColumns {
                key: key.clone(),
                columns: row.slice(min, max, reverse, usize::MAX),
            })
            .collect())
    }

    async fn delete_row(&self, row_key: &str, timestamp_ms: u64) -> Result<()> {
        let mut rows = self.rows.write();
        rows.entry(row_key.to_string())
            .or_default()
            .apply_row_tombstone(timestamp_ms);
        Ok(())
    }

    async fn delete_columns(&self, row_key: &str, names: &[u64], timestamp_ms: u64) -> Result<()> {
        let mut rows = self.rows.write();
        let row = rows.entry(row_key.to_string()).or_default();
        for name in names {
            row.apply_column_tombstone(*name, timestamp_ms);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: u64, value: &str, timestamp: u64) -> Column {
        Column {
            name,
            value: value.to_string(),
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_insert_and_slice() {
        let cf = MemoryColumnFamily::new();
        cf.insert("a", column(10, "ten", 1)).await.unwrap();
        cf.insert("a", column(20, "twenty", 2)).await.unwrap();
        cf.insert("a", column(30, "thirty", 3)).await.unwrap();

        let all = cf.slice("a", None, None, false, usize::MAX).await.unwrap();
        assert_eq!(all.iter().map(|c| c.name).collect::<Vec<_>>(), [10, 20, 30]);

        let bounded = cf.slice("a", Some(15), Some(30), false, usize::MAX).await.unwrap();
        assert_eq!(bounded.iter().map(|c| c.name).collect::<Vec<_>>(), [20, 30]);

        let reversed = cf.slice("a", Some(15), None, true, 1).await.unwrap();
        assert_eq!(reversed[0].name, 30);
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let cf = MemoryColumnFamily::new();
        cf.insert("a", column(10, "old", 5)).await.unwrap();
        cf.insert("a", column(10, "new", 6)).await.unwrap();
        // A stale write must not clobber the newer cell.
        cf.insert("a", column(10, "stale", 4)).await.unwrap();

        let cells = cf.slice("a", None, None, false, usize::MAX).await.unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].value, "new");
        assert_eq!(cells[0].timestamp, 6);
    }

    #[tokio::test]
    async fn test_equal_timestamp_resolves_to_larger_value() {
        let cf = MemoryColumnFamily::new();
        cf.insert("a", column(10, "apple", 5)).await.unwrap();
        cf.insert("a", column(10, "banana", 5)).await.unwrap();
        cf.insert("a", column(10, "aardvark", 5)).await.unwrap();

        let cells = cf.slice("a", None, None, false, usize::MAX).await.unwrap();
        assert_eq!(cells[0].value, "banana");
    }

    #[tokio::test]
    async fn test_row_tombstone_suppresses_older_writes() {
        let cf = MemoryColumnFamily::new();
        cf.insert("a", column(10, "ten", 5)).await.unwrap();
        cf.delete_row("a", 7).await.unwrap();

        assert!(cf.slice("a", None, None, false, usize::MAX).await.unwrap().is_empty());

        // Writes at or before the tombstone never resurrect.
        cf.insert("a", column(10, "late", 7)).await.unwrap();
        assert!(cf.slice("a", None, None, false, usize::MAX).await.unwrap().is_empty());

        // A genuinely newer write lands.
        cf.insert("a", column(10, "fresh", 8)).await.unwrap();
        let cells = cf.slice("a", None, None, false, usize::MAX).await.unwrap();
        assert_eq!(cells[0].value, "fresh");
    }

    #[tokio::test]
    async fn test_column_tombstone_is_per_name() {
        let cf = MemoryColumnFamily::new();
        cf.insert("a", column(10, "ten", 5)).await.unwrap();
        cf.insert("a", column(20, "twenty", 5)).await.unwrap();
        cf.delete_columns("a", &[10], 6).await.unwrap();

        let cells = cf.slice("a", None, None, false, usize::MAX).await.unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].name, 20);

        cf.insert("a", column(10, "dead", 6)).await.unwrap();
        let cells = cf.slice("a", None, None, false, usize::MAX).await.unwrap();
        assert_eq!(cells.len(), 1);
    }

    #[tokio::test]
    async fn test_scan_pages_in_key_order() {
        let cf = MemoryColumnFamily::new();
        for key in ["a", "b", "c", "d"] {
            cf.insert(key, column(10, key, 1)).await.unwrap();
        }

        let first = cf.scan(None, None, None, false, 2).await.unwrap();
        assert_eq!(first.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(), ["a", "b"]);

        let second = cf.scan(Some("b"), None, None, false, 2).await.unwrap();
        assert_eq!(second.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(), ["c", "d"]);

        let third = cf.scan(Some("d"), None, None, false, 2).await.unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn test_scan_keeps_rows_outside_name_range() {
        let cf = MemoryColumnFamily::new();
        cf.insert("a", column(10, "ten", 1)).await.unwrap();
        cf.insert("b", column(99, "far", 1)).await.unwrap();

        let page = cf.scan(None, None, Some(50), false, 10).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].columns.len(), 1);
        assert!(page[1].columns.is_empty());
    }
}
