//! # redb-backed Store
//!
//! A disk-backed store client using the redb embedded database:
//! - ACID transactions and crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//! - Zero configuration
//!
//! Rows are postcard-encoded under a composite (column family, row key)
//! table key; per-column timestamps and last-write-wins semantics match
//! the in-memory backend exactly.

use super::{merge_row, monotonic_micros, strip_timestamps, StoreClient, StoredRow};
use crate::{ColumnName, Row, RowKey, Timestamp, WiderowError};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::AtomicI64;

/// Table for rows: (column_family, row_key) -> postcard-encoded StoredRow.
const ROWS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("rows");

/// A disk-backed store client using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// Monotonic clock state.
    clock: AtomicI64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WiderowError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| WiderowError::IoError(e.to_string()))?;

        // Initialize the table if it doesn't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| WiderowError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(ROWS)
                .map_err(|e| WiderowError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| WiderowError::IoError(e.to_string()))?;
        }

        Ok(Self {
            db,
            clock: AtomicI64::new(0),
        })
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), WiderowError> {
        self.db
            .compact()
            .map_err(|e| WiderowError::IoError(e.to_string()))?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<StoredRow, WiderowError> {
        postcard::from_bytes(bytes).map_err(|e| WiderowError::DeserializationError(e.to_string()))
    }

    fn encode(stored: &StoredRow) -> Result<Vec<u8>, WiderowError> {
        postcard::to_allocvec(stored).map_err(|e| WiderowError::SerializationError(e.to_string()))
    }
}

impl StoreClient for RedbStore {
    fn insert(
        &self,
        column_family: &str,
        key: &RowKey,
        row: Row,
        timestamp: Option<Timestamp>,
    ) -> Result<(), WiderowError> {
        let effective = timestamp.unwrap_or_else(|| self.timestamp());

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| WiderowError::IoError(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(ROWS)
                .map_err(|e| WiderowError::IoError(e.to_string()))?;

            // Read-modify-write within the same transaction.
            let mut stored = table
                .get((column_family, key.as_str()))
                .map_err(|e| WiderowError::IoError(e.to_string()))?
                .map(|data| Self::decode(data.value()))
                .transpose()?
                .unwrap_or_default();
            merge_row(&mut stored, row, effective);

            let bytes = Self::encode(&stored)?;
            table
                .insert((column_family, key.as_str()), bytes.as_slice())
                .map_err(|e| WiderowError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| WiderowError::IoError(e.to_string()))?;
        Ok(())
    }

    fn remove(
        &self,
        column_family: &str,
        key: &RowKey,
        columns: Option<&BTreeSet<ColumnName>>,
        _timestamp: Option<Timestamp>,
    ) -> Result<(), WiderowError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| WiderowError::IoError(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(ROWS)
                .map_err(|e| WiderowError::IoError(e.to_string()))?;

            match columns {
                None => {
                    table
                        .remove((column_family, key.as_str()))
                        .map_err(|e| WiderowError::IoError(e.to_string()))?;
                }
                Some(names) => {
                    let existing = table
                        .get((column_family, key.as_str()))
                        .map_err(|e| WiderowError::IoError(e.to_string()))?
                        .map(|data| Self::decode(data.value()))
                        .transpose()?;

                    if let Some(mut stored) = existing {
                        for name in names {
                            stored.remove(name);
                        }
                        if stored.is_empty() {
                            table
                                .remove((column_family, key.as_str()))
                                .map_err(|e| WiderowError::IoError(e.to_string()))?;
                        } else {
                            let bytes = Self::encode(&stored)?;
                            table
                                .insert((column_family, key.as_str()), bytes.as_slice())
                                .map_err(|e| WiderowError::IoError(e.to_string()))?;
                        }
                    }
                }
            }
        }
        write_txn
            .commit()
            .map_err(|e| WiderowError::IoError(e.to_string()))?;
        Ok(())
    }

    fn get(&self, column_family: &str, key: &RowKey) -> Result<Row, WiderowError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| WiderowError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(ROWS)
            .map_err(|e| WiderowError::IoError(e.to_string()))?;

        let stored = table
            .get((column_family, key.as_str()))
            .map_err(|e| WiderowError::IoError(e.to_string()))?
            .map(|data| Self::decode(data.value()))
            .transpose()?;

        Ok(stored.as_ref().map(strip_timestamps).unwrap_or_default())
    }

    fn multi_get(
        &self,
        column_family: &str,
        keys: &[RowKey],
    ) -> Result<BTreeMap<RowKey, Row>, WiderowError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| WiderowError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(ROWS)
            .map_err(|e| WiderowError::IoError(e.to_string()))?;

        let mut result = BTreeMap::new();
        for key in keys {
            let stored = table
                .get((column_family, key.as_str()))
                .map_err(|e| WiderowError::IoError(e.to_string()))?
                .map(|data| Self::decode(data.value()))
                .transpose()?;
            if let Some(stored) = stored {
                if !stored.is_empty() {
                    result.insert(key.clone(), strip_timestamps(&stored));
                }
            }
        }
        Ok(result)
    }

    fn timestamp(&self) -> Timestamp {
        monotonic_micros(&self.clock)
    }
}

// =============================================================================
// TESTS
// =============================================================================
