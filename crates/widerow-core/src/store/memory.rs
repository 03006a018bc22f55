//! # In-Memory Store
//!
//! A deterministic, volatile store backend:
//! - `BTreeMap`-only cell storage with per-column write timestamps
//! - Last-write-wins conflict resolution matching the disk backend
//! - A journal of every issued operation, so tests can assert exact
//!   store-call counts and shapes ("no store call", "exactly one write")

use super::{merge_row, monotonic_micros, strip_timestamps, StoreClient, StoredRow};
use crate::{ColumnName, Row, RowKey, Timestamp, WiderowError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicI64;
use std::sync::Mutex;

/// One journaled store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// A row insert: target, written column names, and the caller-supplied
    /// timestamp (`None` when the store clock assigned one).
    Insert {
        /// Target column family.
        column_family: String,
        /// Target row key.
        key: RowKey,
        /// Top-level column names written.
        columns: BTreeSet<ColumnName>,
        /// Caller-supplied shared timestamp, if any.
        timestamp: Option<Timestamp>,
    },
    /// A removal: whole row when `columns` is `None`.
    Remove {
        /// Target column family.
        column_family: String,
        /// Target row key.
        key: RowKey,
        /// Removed column names, or `None` for the whole row.
        columns: Option<BTreeSet<ColumnName>>,
        /// Caller-supplied shared timestamp, if any.
        timestamp: Option<Timestamp>,
    },
}

/// The in-memory store backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// column family -> row key -> stored row.
    column_families: Mutex<BTreeMap<String, BTreeMap<RowKey, StoredRow>>>,
    /// Every insert/remove issued, in call order.
    journal: Mutex<Vec<StoreOp>>,
    /// Monotonic clock state.
    clock: AtomicI64,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the operation journal in call order.
    #[must_use]
    pub fn journal(&self) -> Vec<StoreOp> {
        self.journal
            .lock()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }

    /// Drop all journaled operations (storage is untouched).
    pub fn clear_journal(&self) {
        if let Ok(mut ops) = self.journal.lock() {
            ops.clear();
        }
    }

    fn record(&self, op: StoreOp) {
        if let Ok(mut ops) = self.journal.lock() {
            ops.push(op);
        }
    }

    fn lock_families(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, BTreeMap<RowKey, StoredRow>>>, WiderowError>
    {
        self.column_families
            .lock()
            .map_err(|_| WiderowError::IoError("store lock poisoned".into()))
    }
}

impl StoreClient for MemoryStore {
    fn insert(
        &self,
        column_family: &str,
        key: &RowKey,
        row: Row,
        timestamp: Option<Timestamp>,
    ) -> Result<(), WiderowError> {
        self.record(StoreOp::Insert {
            column_family: column_family.to_string(),
            key: key.clone(),
            columns: row.keys().cloned().collect(),
            timestamp,
        });

        let effective = timestamp.unwrap_or_else(|| self.timestamp());
        let mut families = self.lock_families()?;
        let stored = families
            .entry(column_family.to_string())
            .or_default()
            .entry(key.clone())
            .or_default();
        merge_row(stored, row, effective);
        Ok(())
    }

    fn remove(
        &self,
        column_family: &str,
        key: &RowKey,
        columns: Option<&BTreeSet<ColumnName>>,
        timestamp: Option<Timestamp>,
    ) -> Result<(), WiderowError> {
        self.record(StoreOp::Remove {
            column_family: column_family.to_string(),
            key: key.clone(),
            columns: columns.cloned(),
            timestamp,
        });

        let mut families = self.lock_families()?;
        let Some(rows) = families.get_mut(column_family) else {
            return Ok(());
        };
        match columns {
            None => {
                rows.remove(key);
            }
            Some(names) => {
                if let Some(stored) = rows.get_mut(key) {
                    for name in names {
                        stored.remove(name);
                    }
                    if stored.is_empty() {
                        rows.remove(key);
                    }
                }
            }
        }
        Ok(())
    }

    fn get(&self, column_family: &str, key: &RowKey) -> Result<Row, WiderowError> {
        let families = self.lock_families()?;
        Ok(families
            .get(column_family)
            .and_then(|rows| rows.get(key))
            .map(strip_timestamps)
            .unwrap_or_default())
    }

    fn multi_get(
        &self,
        column_family: &str,
        keys: &[RowKey],
    ) -> Result<BTreeMap<RowKey, Row>, WiderowError> {
        let families = self.lock_families()?;
        let mut result = BTreeMap::new();
        if let Some(rows) = families.get(column_family) {
            for key in keys {
                if let Some(stored) = rows.get(key) {
                    if !stored.is_empty() {
                        result.insert(key.clone(), strip_timestamps(stored));
                    }
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
