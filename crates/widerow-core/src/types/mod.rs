//! # Core Type Definitions
//!
//! This module contains the wire-level types shared by every widerow
//! component:
//! - Row addressing (`RowKey`, `ColumnName`)
//! - Cell payloads (`Value`, `ColumnValue`, `Row`)
//! - The store clock unit (`Timestamp`)
//! - Error types (`WiderowError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer timestamps only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// ROW ADDRESSING
// =============================================================================

/// The value that uniquely addresses a row in its column family.
///
/// For primary rows this is the model's identity-key attribute value;
/// for index rows it is the indexed source value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey(pub String);

impl RowKey {
    /// Create a new row key from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the row key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Name of a column (or super-column group) within a row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnName(pub String);

impl ColumnName {
    /// Create a new column name from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the column name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// CELL PAYLOADS
// =============================================================================

/// Value stored in a single cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Value(pub String);

impl Value {
    /// Create a new value from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the value as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A top-level column payload: either one scalar cell or a super-column
/// group of sub-cells stored under a single group name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnValue {
    /// A single scalar cell.
    Scalar(Value),
    /// A super-column group: sub-column name -> cell value.
    Group(BTreeMap<ColumnName, Value>),
}

/// A full row image as exchanged with the store client.
///
/// Uses `BTreeMap` so that row iteration order is always the column-name
/// sort order, matching on-wire column ordering in the backing store.
pub type Row = BTreeMap<ColumnName, ColumnValue>;

// =============================================================================
// TIMESTAMP
// =============================================================================

/// A store write timestamp in microseconds.
///
/// Produced once per mutation build by the store clock; all mutations of a
/// single save share one value. Uses i64 to match the wire representation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Create a new timestamp with the given microsecond value.
    #[must_use]
    pub const fn new(micros: i64) -> Self {
        Self(micros)
    }

    /// Get the raw microsecond value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the widerow mapping layer.
///
/// - No silent failures
/// - Use `Result<T, WiderowError>` for fallible operations
/// - The three mapping-level errors (`UndefinedKey`, `InvalidArgument`,
///   `RecordNotFound`) are unrecoverable at this layer and propagate to
///   the caller; store-level failures are carried without translation.
#[derive(Debug, Error)]
pub enum WiderowError {
    /// The identity-key attribute was unset at save or mutation-build time.
    #[error("Identity key attribute is not set")]
    UndefinedKey,

    /// A malformed call, e.g. `find_many` with an empty key slice.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A batch retrieval returned fewer rows than requested and the caller
    /// did not opt into partial results.
    #[error("Records not found: requested {requested}, found {found}")]
    RecordNotFound {
        /// Number of keys requested.
        requested: usize,
        /// Number of non-empty rows returned.
        found: usize,
    },

    /// The record was destroyed; destroyed records reject all mutation.
    #[error("Record is frozen after destroy")]
    FrozenRecord,

    /// An attribute name not declared on the model was read or written.
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// An I/O error occurred in a store backend.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_iterates_in_column_order() {
        let mut row = Row::new();
        row.insert(ColumnName::new("b"), ColumnValue::Scalar(Value::new("2")));
        row.insert(ColumnName::new("a"), ColumnValue::Scalar(Value::new("1")));
        row.insert(ColumnName::new("c"), ColumnValue::Scalar(Value::new("3")));

        let names: Vec<_> = row.keys().map(ColumnName::as_str).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn timestamp_ordering() {
        assert!(Timestamp::new(1) < Timestamp::new(2));
        assert_eq!(Timestamp::new(5).value(), 5);
    }

    #[test]
    fn record_not_found_message_carries_counts() {
        let err = WiderowError::RecordNotFound {
            requested: 3,
            found: 1,
        };
        assert_eq!(err.to_string(), "Records not found: requested 3, found 1");
    }
}
