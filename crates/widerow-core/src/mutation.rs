//! # Mutation Builder
//!
//! Pure transformation from an ordered attribute projection plus one
//! timestamp into the ordered wire mutations for a single row:
//! - Flat mode: scalar upserts, with all deletions coalesced into a single
//!   deletion mutation opened at the position of the first nil entry
//! - Grouped mode: one super-column upsert per non-empty group
//!
//! No store access happens here; the persistence engine translates the
//! returned mutations into `insert`/`remove` calls.

use crate::{AttrValue, ColumnName, Timestamp, Value, WiderowError};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// WRITE MODE
// =============================================================================

/// The per-model write strategy, fixed at model registration by the kind of
/// the first declared attribute. A model never mixes modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Scalar columns only.
    Flat,
    /// Super-column groups only.
    Grouped,
}

// =============================================================================
// MUTATION
// =============================================================================

/// One wire-level operation against a single row.
///
/// Deletions within one build are coalesced into at most one `Deletion`
/// carrying the full set of deleted column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert or overwrite one scalar column.
    Upsert {
        /// Target column name.
        column: ColumnName,
        /// Cell value.
        value: Value,
        /// Shared build timestamp.
        timestamp: Timestamp,
    },
    /// Insert or overwrite one super-column group.
    GroupUpsert {
        /// Group (super-column) name.
        group: ColumnName,
        /// Sub-column name -> value pairs, nil sub-columns already filtered.
        columns: BTreeMap<ColumnName, Value>,
        /// Shared build timestamp.
        timestamp: Timestamp,
    },
    /// Delete a set of top-level columns.
    Deletion {
        /// Shared build timestamp.
        timestamp: Timestamp,
        /// Names of the deleted columns.
        columns: BTreeSet<ColumnName>,
    },
}

/// An ordered attribute projection: attribute name paired with its value,
/// where `None` means "delete this attribute". Order is the model's
/// attribute declaration order.
pub type WriteStructure = Vec<(String, Option<AttrValue>)>;

// =============================================================================
// MUTATION BUILDER
// =============================================================================

/// The MutationBuilder turns a projection into ordered wire mutations.
///
/// All mutations of one build share the single supplied timestamp; the
/// clock is sampled once per save, never per column.
pub struct MutationBuilder;

impl MutationBuilder {
    /// Build the ordered mutation list for one row write.
    ///
    /// Flat mode iterates the structure in order: each non-nil scalar
    /// becomes one upsert, and nils are collected into a single deletion
    /// positioned where the first nil was encountered. Grouped mode emits
    /// one upsert per non-empty group; empty groups emit nothing and nil
    /// sub-columns are dropped (whole-group replace is the only supported
    /// grouped write path).
    ///
    /// Returns `WiderowError::InvalidArgument` when a value's shape does
    /// not match the mode; unreachable for structures projected through a
    /// validated `ModelConfig`.
    pub fn build(
        mode: WriteMode,
        structure: &WriteStructure,
        timestamp: Timestamp,
    ) -> Result<Vec<Mutation>, WiderowError> {
        match mode {
            WriteMode::Flat => Self::build_flat(structure, timestamp),
            WriteMode::Grouped => Self::build_grouped(structure, timestamp),
        }
    }

    fn build_flat(
        structure: &WriteStructure,
        timestamp: Timestamp,
    ) -> Result<Vec<Mutation>, WiderowError> {
        let mut mutations = Vec::with_capacity(structure.len());
        // Index of the coalesced deletion mutation, once opened.
        let mut deletion_at: Option<usize> = None;

        for (name, value) in structure {
            match value {
                Some(AttrValue::Scalar(v)) => {
                    mutations.push(Mutation::Upsert {
                        column: ColumnName::new(name.clone()),
                        value: v.clone(),
                        timestamp,
                    });
                }
                Some(AttrValue::Group(_)) => {
                    return Err(WiderowError::InvalidArgument(format!(
                        "grouped value for attribute '{name}' in a flat-mode model"
                    )));
                }
                None => {
                    let idx = match deletion_at {
                        Some(idx) => idx,
                        None => {
                            mutations.push(Mutation::Deletion {
                                timestamp,
                                columns: BTreeSet::new(),
                            });
                            let idx = mutations.len() - 1;
                            deletion_at = Some(idx);
                            idx
                        }
                    };
                    if let Some(Mutation::Deletion { columns, .. }) = mutations.get_mut(idx) {
                        columns.insert(ColumnName::new(name.clone()));
                    }
                }
            }
        }

        Ok(mutations)
    }

    fn build_grouped(
        structure: &WriteStructure,
        timestamp: Timestamp,
    ) -> Result<Vec<Mutation>, WiderowError> {
        let mut mutations = Vec::with_capacity(structure.len());

        for (name, value) in structure {
            match value {
                Some(AttrValue::Group(sub)) => {
                    let columns: BTreeMap<ColumnName, Value> = sub
                        .iter()
                        .filter_map(|(col, v)| v.clone().map(|v| (col.clone(), v)))
                        .collect();
                    if !columns.is_empty() {
                        mutations.push(Mutation::GroupUpsert {
                            group: ColumnName::new(name.clone()),
                            columns,
                            timestamp,
                        });
                    }
                }
                Some(AttrValue::Scalar(_)) => {
                    return Err(WiderowError::InvalidArgument(format!(
                        "scalar value for attribute '{name}' in a grouped-mode model"
                    )));
                }
                // Sub-column deletion tracking is not supported; a nil
                // group emits nothing rather than a deletion.
                None => {}
            }
        }

        Ok(mutations)
    }
}

// =============================================================================
// TESTS
// =============================================================================
