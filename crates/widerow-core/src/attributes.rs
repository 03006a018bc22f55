//! # Attribute Set
//!
//! The in-memory attribute bag backing every record:
//! - Named slots holding scalar or grouped values
//! - Explicit-nil support (a slot set to `None` means "delete this column")
//! - Dirty tracking: which slots were explicitly assigned at all, and which
//!   changed since the last load or save
//!
//! The set itself is name-agnostic; declaration order and kind validation
//! live in `ModelConfig` and `Record`.

use crate::{ColumnName, Value};
use std::collections::{BTreeMap, BTreeSet};

/// An in-memory attribute value.
///
/// Mirrors the wire `ColumnValue` shape, except that group sub-columns may
/// be explicitly nil; nil sub-columns are filtered out at mutation-build
/// time because sub-column deletion tracking is not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// A single scalar value.
    Scalar(Value),
    /// A grouped (super-column) value: sub-column name -> value or nil.
    Group(BTreeMap<ColumnName, Option<Value>>),
}

impl AttrValue {
    /// Convenience constructor for a scalar attribute value.
    #[must_use]
    pub fn scalar(s: impl Into<String>) -> Self {
        Self::Scalar(Value::new(s))
    }

    /// Get the scalar value, if this is a scalar.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Group(_) => None,
        }
    }
}

/// Named attribute slots with assignment and change tracking.
///
/// A slot is *defined* once it has been explicitly assigned (including an
/// assignment to nil) or populated by a load. A slot is *changed* when it
/// was assigned since the last load or save. Both sets use `BTreeSet` for
/// deterministic iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    /// Slot values; an entry holding `None` is an explicit nil.
    values: BTreeMap<String, Option<AttrValue>>,
    /// Names assigned since the last load or save.
    changed: BTreeSet<String>,
}

impl AttributeSet {
    /// Create a new empty attribute set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a slot, marking it defined and changed.
    ///
    /// `None` is an explicit nil: the slot stays defined and the column is
    /// deleted on the next save.
    pub fn set(&mut self, name: impl Into<String>, value: Option<AttrValue>) {
        let name = name.into();
        self.changed.insert(name.clone());
        self.values.insert(name, value);
    }

    /// Populate a slot from a store load without marking it changed.
    pub fn load(&mut self, name: impl Into<String>, value: AttrValue) {
        self.values.insert(name.into(), Some(value));
    }

    /// Get the current value of a slot.
    ///
    /// Returns `None` when the slot is undefined or explicitly nil; use
    /// [`AttributeSet::is_defined`] to tell the two apart.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name).and_then(Option::as_ref)
    }

    /// Get the scalar value of a slot, if defined and scalar.
    #[must_use]
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(AttrValue::as_scalar)
    }

    /// Check whether a slot has been explicitly assigned or loaded.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Check whether a slot was assigned since the last load or save.
    #[must_use]
    pub fn is_changed(&self, name: &str) -> bool {
        self.changed.contains(name)
    }

    /// Names of all defined slots in sorted order.
    #[must_use]
    pub fn defined_names(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    /// Names of all changed slots in sorted order.
    #[must_use]
    pub fn changed_names(&self) -> Vec<&str> {
        self.changed.iter().map(String::as_str).collect()
    }

    /// Check whether any slot changed since the last load or save.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Clear change tracking after a successful load or save.
    pub fn clear_changes(&mut self) {
        self.changed.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
