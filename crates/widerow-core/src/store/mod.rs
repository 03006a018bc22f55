//! # Store Clients
//!
//! The wide-column store contract consumed by the persistence and index
//! engines, plus the two shipped backends:
//! - `MemoryStore`: in-memory `BTreeMap` cells (fast, volatile, journaled)
//! - `RedbStore`: disk-backed rows in redb (ACID, persistent)
//!
//! Everything above this module is pure logic against the `StoreClient`
//! trait; swapping backends never changes mapping semantics.

mod memory;
mod redb_store;

pub use memory::{MemoryStore, StoreOp};
pub use redb_store::RedbStore;

use crate::{ColumnName, ColumnValue, Row, RowKey, Timestamp, WiderowError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// =============================================================================
// STORE CLIENT TRAIT
// =============================================================================

/// The opaque column-family store client.
///
/// Methods take `&self` so one handle can be shared across model types
/// through `Arc`; backends use interior mutability. Calls are synchronous
/// and blocking; retries, timeouts and cross-row atomicity are explicitly
/// not this layer's concern.
pub trait StoreClient: Send + Sync {
    /// Insert or overwrite columns of one row.
    ///
    /// When `timestamp` is `None` the store assigns one from its own clock.
    /// Conflict resolution is per-column last-write-wins by timestamp.
    fn insert(
        &self,
        column_family: &str,
        key: &RowKey,
        row: Row,
        timestamp: Option<Timestamp>,
    ) -> Result<(), WiderowError>;

    /// Remove a whole row (`columns = None`) or a set of its top-level
    /// columns.
    fn remove(
        &self,
        column_family: &str,
        key: &RowKey,
        columns: Option<&BTreeSet<ColumnName>>,
        timestamp: Option<Timestamp>,
    ) -> Result<(), WiderowError>;

    /// Read one row. Absent rows come back as an empty `Row`.
    fn get(&self, column_family: &str, key: &RowKey) -> Result<Row, WiderowError>;

    /// Read many rows in one call. Missing or empty rows are absent from
    /// the result.
    fn multi_get(
        &self,
        column_family: &str,
        keys: &[RowKey],
    ) -> Result<BTreeMap<RowKey, Row>, WiderowError>;

    /// Produce a monotonically increasing microsecond timestamp.
    ///
    /// Sampled once per save; every mutation of that save shares the value.
    fn timestamp(&self) -> Timestamp;
}

// =============================================================================
// STORED CELLS (shared by both backends)
// =============================================================================

/// One stored top-level column: payload plus its write timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredColumn {
    pub value: ColumnValue,
    pub timestamp: Timestamp,
}

/// A stored row image with per-column timestamps.
pub(crate) type StoredRow = BTreeMap<ColumnName, StoredColumn>;

/// Merge incoming columns into a stored row with last-write-wins.
///
/// A write only lands when its timestamp is not older than the existing
/// cell's; ties go to the incoming write.
pub(crate) fn merge_row(stored: &mut StoredRow, incoming: Row, timestamp: Timestamp) {
    for (column, value) in incoming {
        let stale = stored
            .get(&column)
            .is_some_and(|cell| cell.timestamp > timestamp);
        if !stale {
            stored.insert(column, StoredColumn { value, timestamp });
        }
    }
}

/// Strip timestamps off a stored row, yielding the wire `Row` shape.
pub(crate) fn strip_timestamps(stored: &StoredRow) -> Row {
    stored
        .iter()
        .map(|(column, cell)| (column.clone(), cell.value.clone()))
        .collect()
}

/// Advance a shared clock cell to a strictly increasing microsecond value.
pub(crate) fn monotonic_micros(last: &AtomicI64) -> Timestamp {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
        .unwrap_or(0);

    let mut prev = last.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev.saturating_add(1));
        match last.compare_exchange(prev, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return Timestamp::new(next),
            Err(observed) => prev = observed,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
