//! Startup schema management
//!
//! Runs exactly once, before any read or write: ensures the keyspace
//! exists, ensures the `dynamic_announcements` column family exists with a
//! tombstone grace of zero, and updates the recorded grace in place if it
//! differs. Any failure here is fatal to the process. The registry is a
//! liveness cache, not a system of record, so deleted columns must take the
//! shortest path to physical removal and must never come back.

use crate::column::ColumnFamily;
use crate::durable::RedbColumnFamily;
use crate::memory::MemoryColumnFamily;
use beacon_common::{Error, Result, StoreBackend, StoreConfig};
use redb::{Database, ReadableTable, TableDefinition};
use std::sync::Arc;
use tracing::info;

/// Name of the column family holding dynamic announcements.
pub const COLUMN_FAMILY: &str = "dynamic_announcements";

/// Tombstone grace applied to the column family.
pub const GC_GRACE_SECONDS: u64 = 0;

/// Schema settings: "{column_family}.gc_grace_seconds" → seconds
const SETTINGS: TableDefinition<&str, u64> = TableDefinition::new("schema_settings");

/// Ensure the keyspace and column family exist with the required storage
/// parameters, and return the client handle the store will use.
pub fn ensure(config: &StoreConfig, keyspace: &str) -> Result<Arc<dyn ColumnFamily>> {
    match config.backend {
        StoreBackend::Memory => {
            info!(keyspace, column_family = COLUMN_FAMILY, "using in-memory keyspace");
            Ok(Arc::new(MemoryColumnFamily::new()))
        }
        StoreBackend::Redb => {
            std::fs::create_dir_all(&config.data_dir)?;
            let path = config.data_dir.join(format!("{keyspace}.redb"));
            let db = Database::create(&path)
                .map_err(|e| Error::schema(format!("cannot open keyspace {}: {e}", path.display())))?;
            let db = Arc::new(db);

            ensure_grace(&db)?;

            info!(
                keyspace,
                column_family = COLUMN_FAMILY,
                path = %path.display(),
                "keyspace ready"
            );
            Ok(Arc::new(RedbColumnFamily::new(Arc::clone(&db))?))
        }
    }
}

fn ensure_grace(db: &Database) -> Result<()> {
    let txn = db
        .begin_write()
        .map_err(|e| Error::schema(e.to_string()))?;
    {
        let mut settings = txn
            .open_table(SETTINGS)
            .map_err(|e| Error::schema(e.to_string()))?;
        let key = format!("{COLUMN_FAMILY}.gc_grace_seconds");
        let recorded = settings
            .get(key.as_str())
            .map_err(|e| Error::schema(e.to_string()))?
            .map(|g| g.value());

        match recorded {
            Some(grace) if grace == GC_GRACE_SECONDS => {}
            Some(grace) => {
                info!(
                    column_family = COLUMN_FAMILY,
                    from = grace,
                    to = GC_GRACE_SECONDS,
                    "updating tombstone grace in place"
                );
                settings
                    .insert(key.as_str(), GC_GRACE_SECONDS)
                    .map_err(|e| Error::schema(e.to_string()))?;
            }
            None => {
                settings
                    .insert(key.as_str(), GC_GRACE_SECONDS)
                    .map_err(|e| Error::schema(e.to_string()))?;
            }
        }
    }
    txn.commit().map_err(|e| Error::schema(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_common::StoreBackend;
    use tempfile::tempdir;

    #[test]
    fn test_memory_backend() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            data_dir: "/nonexistent".into(),
        };
        assert!(ensure(&config, "discovery").is_ok());
    }

    #[test]
    fn test_redb_backend_creates_keyspace_file() {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Redb,
            data_dir: dir.path().to_path_buf(),
        };

        ensure(&config, "discovery").unwrap();
        assert!(dir.path().join("discovery.redb").exists());
    }

    #[test]
    fn test_grace_recorded_and_repaired() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("discovery.redb");

        // Seed a keyspace whose recorded grace differs.
        {
            let db = Database::create(&path).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let mut settings = txn.open_table(SETTINGS).unwrap();
                settings
                    .insert("dynamic_announcements.gc_grace_seconds", 864_000u64)
                    .unwrap();
            }
            txn.commit().unwrap();
        }

        let config = StoreConfig {
            backend: StoreBackend::Redb,
            data_dir: dir.path().to_path_buf(),
        };
        ensure(&config, "discovery").unwrap();

        let db = Database::create(&path).unwrap();
        let txn = db.begin_read().unwrap();
        let settings = txn.open_table(SETTINGS).unwrap();
        let grace = settings
            .get("dynamic_announcements.gc_grace_seconds")
            .unwrap()
            .map(|g| g.value());
        assert_eq!(grace, Some(GC_GRACE_SECONDS));
    }
}
