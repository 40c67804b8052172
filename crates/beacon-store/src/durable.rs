//! Durable column family backed by redb
//!
//! Cells live under composite `"{row}\x00{name:016x}"` string keys so one
//! row's columns are contiguous and range scans stay cheap. Values are
//! JSON cell records carrying the write timestamp; tombstones live in
//! sibling tables and apply the same suppression rule as the backing
//! store: a write at or before a tombstone's timestamp stays dead.
//!
//! Row keys must not contain NUL; the registry only uses canonical UUID
//! strings.

use crate::column::{Column, ColumnFamily, RowColumns};
use async_trait::async_trait;
use beacon_common::{Error, Result};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ── Table definitions ────────────────────────────────────────────────────────

/// Cells: "{row}\x00{name:016x}" → JSON(CellRecord)
const COLUMNS: TableDefinition<&str, &str> = TableDefinition::new("dynamic_announcements");
/// Column tombstones: same composite key → delete timestamp (ms)
const COLUMN_TOMBSTONES: TableDefinition<&str, u64> =
    TableDefinition::new("dynamic_announcements.column_tombstones");
/// Row tombstones: row key → delete timestamp (ms)
const ROW_TOMBSTONES: TableDefinition<&str, u64> =
    TableDefinition::new("dynamic_announcements.row_tombstones");

#[derive(Debug, Serialize, Deserialize)]
struct CellRecord {
    value: String,
    timestamp: u64,
}

fn cell_key(row_key: &str, name: u64) -> String {
    format!("{row_key}\x00{name:016x}")
}

fn split_cell_key(key: &str) -> Option<(&str, u64)> {
    let (row, hex) = key.split_once('\x00')?;
    u64::from_str_radix(hex, 16).ok().map(|name| (row, name))
}

fn store_err(err: impl fmt::Display) -> Error {
    Error::storage(err.to_string())
}

/// Durable column family on a single redb database.
pub struct RedbColumnFamily {
    db: Arc<Database>,
}

impl RedbColumnFamily {
    /// Wrap an open database, creating the column family tables if they do
    /// not exist yet.
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let txn = db.begin_write().map_err(store_err)?;
        txn.open_table(COLUMNS).map_err(store_err)?;
        txn.open_table(COLUMN_TOMBSTONES).map_err(store_err)?;
        txn.open_table(ROW_TOMBSTONES).map_err(store_err)?;
        txn.commit().map_err(store_err)?;
        Ok(Self { db })
    }
}

#[async_trait]
impl ColumnFamily for RedbColumnFamily {
    async fn insert(&self, row_key: &str, column: Column) -> Result<()> {
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            let key = cell_key(row_key, column.name);

            let row_tombstone = {
                let tombstones = txn.open_table(ROW_TOMBSTONES).map_err(store_err)?;
                let value = tombstones
                    .get(row_key)
                    .map_err(store_err)?
                    .map(|g| g.value())
                    .unwrap_or(0);
                value
            };
            let column_tombstone = {
                let tombstones = txn.open_table(COLUMN_TOMBSTONES).map_err(store_err)?;
                let value = tombstones
                    .get(key.as_str())
                    .map_err(store_err)?
                    .map(|g| g.value())
                    .unwrap_or(0);
                value
            };

            if column.timestamp > row_tombstone.max(column_tombstone) {
                let mut cells = txn.open_table(COLUMNS).map_err(store_err)?;
                let keep_existing = match cells.get(key.as_str()).map_err(store_err)? {
                    Some(guard) => {
                        let existing: CellRecord = serde_json::from_str(guard.value())?;
                        existing.timestamp > column.timestamp
                            || (existing.timestamp == column.timestamp
                                && existing.value >= column.value)
                    }
                    None => false,
                };
                if !keep_existing {
                    let record = serde_json::to_string(&CellRecord {
                        value: column.value,
                        timestamp: column.timestamp,
                    })?;
                    cells
                        .insert(key.as_str(), record.as_str())
                        .map_err(store_err)?;
                }
            }
        }
        txn.commit().map_err(store_err)?;
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
        if min.unwrap_or(0) > max.unwrap_or(u64::MAX) {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read().map_err(store_err)?;
        let cells = txn.open_table(COLUMNS).map_err(store_err)?;

        let start = cell_key(row_key, min.unwrap_or(0));
        let end = cell_key(row_key, max.unwrap_or(u64::MAX));

        let mut columns = Vec::new();
        for entry in cells
            .range(start.as_str()..=end.as_str())
            .map_err(store_err)?
        {
            let (key, value) = entry.map_err(store_err)?;
            let Some((_, name)) = split_cell_key(key.value()) else {
                continue;
            };
            let record: CellRecord = serde_json::from_str(value.value())?;
            columns.push(Column {
                name,
                value: record.value,
                timestamp: record.timestamp,
            });
        }

        if reverse {
            columns.reverse();
        }
        columns.truncate(limit);
        Ok(columns)
    }

    async fn scan(
        &self,
        start_after: Option<&str>,
        min: Option<u64>,
        max: Option<u64>,
        reverse: bool,
        page_size: usize,
    ) -> Result<Vec<RowColumns>> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let cells = txn.open_table(COLUMNS).map_err(store_err)?;

        // "\x01" sorts after every composite key of the previous row.
        let lower = start_after.map(|row| format!("{row}\x01"));
        let range = match &lower {
            Some(lower) => cells.range(lower.as_str()..).map_err(store_err)?,
            None => cells.range::<&str>(..).map_err(store_err)?,
        };

        let lo = min.unwrap_or(0);
        let hi = max.unwrap_or(u64::MAX);

        let mut rows: Vec<RowColumns> = Vec::new();
        for entry in range {
            let (key, value) = entry.map_err(store_err)?;
            let Some((row, name)) = split_cell_key(key.value()) else {
                continue;
            };

            if rows.last().map(|r| r.key.as_str()) != Some(row) {
                if rows.len() == page_size {
                    break;
                }
                rows.push(RowColumns {
                    key: row.to_string(),
                    columns: Vec::new(),
                });
            }

            if name >= lo && name <= hi {
                let record: CellRecord = serde_json::from_str(value.value())?;
                if let Some(current) = rows.last_mut() {
                    current.columns.push(Column {
                        name,
                        value: record.value,
                        timestamp: record.timestamp,
                    });
                }
            }
        }

        if reverse {
            for row in &mut rows {
                row.columns.reverse();
            }
        }
        Ok(rows)
    }

    async fn delete_row(&self, row_key: &str, timestamp_ms: u64) -> Result<()> {
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            {
                let mut tombstones = txn.open_table(ROW_TOMBSTONES).map_err(store_err)?;
                let current = tombstones
                    .get(row_key)
                    .map_err(store_err)?
                    .map(|g| g.value())
                    .unwrap_or(0);
                if timestamp_ms > current {
                    tombstones
                        .insert(row_key, timestamp_ms)
                        .map_err(store_err)?;
                }
            }

            let mut cells = txn.open_table(COLUMNS).map_err(store_err)?;
            let start = cell_key(row_key, 0);
            let end = cell_key(row_key, u64::MAX);
            let doomed: Vec<String> = {
                let mut keys = Vec::new();
                for entry in cells
                    .range(start.as_str()..=end.as_str())
                    .map_err(store_err)?
                {
                    let (key, value) = entry.map_err(store_err)?;
                    let record: CellRecord = serde_json::from_str(value.value())?;
                    if record.timestamp <= timestamp_ms {
                        keys.push(key.value().to_string());
                    }
                }
                keys
            };
            for key in &doomed {
                cells.remove(key.as_str()).map_err(store_err)?;
            }
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }

    async fn delete_columns(&self, row_key: &str, names: &[u64], timestamp_ms: u64) -> Result<()> {
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut tombstones = txn.open_table(COLUMN_TOMBSTONES).map_err(store_err)?;
            let mut cells = txn.open_table(COLUMNS).map_err(store_err)?;

            for name in names {
                let key = cell_key(row_key, *name);

                let current = tombstones
                    .get(key.as_str())
                    .map_err(store_err)?
                    .map(|g| g.value())
                    .unwrap_or(0);
                if timestamp_ms > current {
                    tombstones
                        .insert(key.as_str(), timestamp_ms)
                        .map_err(store_err)?;
                }

                let expired = match cells.get(key.as_str()).map_err(store_err)? {
                    Some(guard) => {
                        let record: CellRecord = serde_json::from_str(guard.value())?;
                        record.timestamp <= timestamp_ms
                    }
                    None => false,
                };
                if expired {
                    cells.remove(key.as_str()).map_err(store_err)?;
                }
            }
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }
}
