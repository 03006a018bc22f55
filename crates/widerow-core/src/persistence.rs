//! # Persistence Engine
//!
//! The record lifecycle against the store: save (create or partial
//! update), find, delete and destroy. Writes go through the
//! `MutationBuilder` so flat and grouped models share one code path, and
//! every lifecycle transition runs through the model's callback pipeline.

use crate::callbacks::LifecycleStage;
use crate::model::{ModelType, Record, RecordState};
use crate::mutation::{Mutation, MutationBuilder};
use crate::types::{ColumnName, ColumnValue, Row, RowKey, WiderowError};
use crate::AttrValue;
use std::collections::BTreeSet;
use std::sync::Arc;

// =============================================================================
// OPTIONS AND OUTCOMES
// =============================================================================

/// Options for multi-key finds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Skip keys with no stored row instead of failing with
    /// `RecordNotFound`. Index-driven loads use this to tolerate stale
    /// index entries.
    pub allow_missing: bool,
}

/// What a lifecycle operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The operation ran and its callbacks completed.
    Applied,
    /// A before-hook vetoed the operation, or a no-op update
    /// short-circuited. No store traffic happened.
    Skipped,
}

// =============================================================================
// PERSISTENCE ENGINE
// =============================================================================

/// Lifecycle operations over records.
pub struct PersistenceEngine;

impl PersistenceEngine {
    /// Save a record: full write when new, changed-attributes-only when
    /// already persisted.
    ///
    /// A persisted record with no tracked changes short-circuits before
    /// any callback runs. Hook order is before-save, before-create or
    /// before-update, the row write, after-create or after-update,
    /// after-save; the first before-hook returning `false` vetoes the
    /// save.
    pub fn save(record: &mut Record) -> Result<SaveOutcome, WiderowError> {
        if record.is_destroyed() {
            return Err(WiderowError::FrozenRecord);
        }
        let creating = record.is_new();
        if !creating && !record.attributes().has_changes() {
            return Ok(SaveOutcome::Skipped);
        }
        if record.key().is_none() {
            return Err(WiderowError::UndefinedKey);
        }

        let inner = if creating {
            LifecycleStage::Create
        } else {
            LifecycleStage::Update
        };
        let callbacks = Arc::clone(record.model());
        if !callbacks.callbacks().run_before(LifecycleStage::Save, record)? {
            return Ok(SaveOutcome::Skipped);
        }
        if !callbacks.callbacks().run_before(inner, record)? {
            return Ok(SaveOutcome::Skipped);
        }

        Self::write(record, !creating)?;

        record.set_state(RecordState::Persisted);
        record.attributes_mut().clear_changes();

        callbacks.callbacks().run_after(inner, record)?;
        callbacks.callbacks().run_after(LifecycleStage::Save, record)?;
        Ok(SaveOutcome::Applied)
    }

    /// Build and apply the mutations for one row write.
    ///
    /// The clock is sampled once; when the write spans an insert and a
    /// removal, or removes more than one column, the shared timestamp is
    /// passed to the store explicitly so every cell of the save carries
    /// the same stamp.
    fn write(record: &Record, only_changed: bool) -> Result<(), WiderowError> {
        let key = record.key().ok_or(WiderowError::UndefinedKey)?;
        let store = record.connection();
        let timestamp = store.timestamp();

        let structure = record.write_structure(only_changed);
        let mutations =
            MutationBuilder::build(record.config().write_mode(), &structure, timestamp)?;

        let mut row = Row::new();
        let mut deletions: BTreeSet<ColumnName> = BTreeSet::new();
        for mutation in mutations {
            match mutation {
                Mutation::Upsert { column, value, .. } => {
                    row.insert(column, ColumnValue::Scalar(value));
                }
                Mutation::GroupUpsert { group, columns, .. } => {
                    row.insert(group, ColumnValue::Group(columns));
                }
                Mutation::Deletion { columns, .. } => {
                    deletions.extend(columns);
                }
            }
        }

        let explicit = (!row.is_empty() && !deletions.is_empty()) || deletions.len() >= 2;
        let stamp = explicit.then_some(timestamp);
        if !row.is_empty() {
            store.insert(record.config().column_family(), &key, row, stamp)?;
        }
        if !deletions.is_empty() {
            store.remove(
                record.config().column_family(),
                &key,
                Some(&deletions),
                stamp,
            )?;
        }
        Ok(())
    }

    /// Load one record by key. A missing or empty row is
    /// `RecordNotFound`.
    pub fn find_one(model: &Arc<ModelType>, key: &RowKey) -> Result<Record, WiderowError> {
        let row = model
            .connection()
            .get(model.config().column_family(), key)?;
        if row.is_empty() {
            return Err(WiderowError::RecordNotFound {
                requested: 1,
                found: 0,
            });
        }
        Self::instantiate_from_row(model, key, row)
    }

    /// Load many records by key, preserving input order and dropping
    /// duplicate keys.
    ///
    /// An empty key slice is `InvalidArgument`. Without `allow_missing`,
    /// any absent row fails the whole call with `RecordNotFound` carrying
    /// the requested and found counts.
    pub fn find_many(
        model: &Arc<ModelType>,
        keys: &[RowKey],
        options: FindOptions,
    ) -> Result<Vec<Record>, WiderowError> {
        if keys.is_empty() {
            return Err(WiderowError::InvalidArgument(
                "find requires at least one key".into(),
            ));
        }
        let mut unique: Vec<RowKey> = Vec::with_capacity(keys.len());
        let mut seen = BTreeSet::new();
        for key in keys {
            if seen.insert(key.clone()) {
                unique.push(key.clone());
            }
        }

        let mut rows = model
            .connection()
            .multi_get(model.config().column_family(), &unique)?;
        if !options.allow_missing && rows.len() != unique.len() {
            return Err(WiderowError::RecordNotFound {
                requested: unique.len(),
                found: rows.len(),
            });
        }

        let mut records = Vec::with_capacity(rows.len());
        for key in &unique {
            if let Some(row) = rows.remove(key) {
                records.push(Self::instantiate_from_row(model, key, row)?);
            }
        }
        Ok(records)
    }

    /// Remove whole rows directly. No instantiation, no callbacks.
    pub fn delete(model: &Arc<ModelType>, keys: &[RowKey]) -> Result<(), WiderowError> {
        let store = model.connection();
        for key in keys {
            store.remove(model.config().column_family(), key, None, None)?;
        }
        Ok(())
    }

    /// Load and destroy each record, running destroy callbacks. The load
    /// is strict: any missing row fails the whole call.
    pub fn destroy_keys(model: &Arc<ModelType>, keys: &[RowKey]) -> Result<(), WiderowError> {
        let records = Self::find_many(model, keys, FindOptions::default())?;
        for mut record in records {
            Self::destroy(&mut record)?;
        }
        Ok(())
    }

    /// Destroy one record: run destroy callbacks, remove its row, freeze
    /// the instance.
    ///
    /// A never-saved record freezes without callbacks or store traffic. A
    /// before-hook veto skips the removal, but the record freezes either
    /// way. Index rows pointing at the record are left behind; index reads
    /// tolerate the stale entries.
    pub fn destroy(record: &mut Record) -> Result<SaveOutcome, WiderowError> {
        if record.is_destroyed() {
            return Err(WiderowError::FrozenRecord);
        }
        if record.is_new() {
            record.set_state(RecordState::Destroyed);
            return Ok(SaveOutcome::Applied);
        }
        let key = record.key().ok_or(WiderowError::UndefinedKey)?;

        let model = Arc::clone(record.model());
        if !model
            .callbacks()
            .run_before(LifecycleStage::Destroy, record)?
        {
            record.set_state(RecordState::Destroyed);
            return Ok(SaveOutcome::Skipped);
        }

        record
            .connection()
            .remove(record.config().column_family(), &key, None, None)?;
        record.set_state(RecordState::Destroyed);

        model.callbacks().run_after(LifecycleStage::Destroy, record)?;
        Ok(SaveOutcome::Applied)
    }

    /// Remove one record's row without callbacks and freeze the instance.
    ///
    /// A never-saved record freezes without store traffic.
    pub fn delete_record(record: &mut Record) -> Result<(), WiderowError> {
        if record.is_destroyed() {
            return Err(WiderowError::FrozenRecord);
        }
        if !record.is_new() {
            let key = record.key().ok_or(WiderowError::UndefinedKey)?;
            record
                .connection()
                .remove(record.config().column_family(), &key, None, None)?;
        }
        record.set_state(RecordState::Destroyed);
        Ok(())
    }

    /// Build a persisted record from a stored row and run after-load
    /// hooks.
    ///
    /// Columns not declared on the model are dropped, so rows written by
    /// an older schema still load.
    fn instantiate_from_row(
        model: &Arc<ModelType>,
        key: &RowKey,
        row: Row,
    ) -> Result<Record, WiderowError> {
        let mut record = model.instantiate();
        record.attributes_mut().load(
            model.config().key_attribute(),
            AttrValue::scalar(key.as_str()),
        );
        for (column, value) in row {
            if !model.config().is_declared(column.as_str()) {
                continue;
            }
            let attr = match value {
                ColumnValue::Scalar(v) => AttrValue::Scalar(v),
                ColumnValue::Group(columns) => AttrValue::Group(
                    columns.into_iter().map(|(name, v)| (name, Some(v))).collect(),
                ),
            };
            record.attributes_mut().load(column.as_str(), attr);
        }
        record.set_state(RecordState::Persisted);
        model
            .callbacks()
            .run_after(LifecycleStage::Load, &mut record)?;
        Ok(record)
    }
}

// =============================================================================
// CONVENIENCE SURFACES
// =============================================================================

impl Record {
    /// Save this record. See `PersistenceEngine::save`.
    pub fn save(&mut self) -> Result<SaveOutcome, WiderowError> {
        PersistenceEngine::save(self)
    }

    /// Destroy this record with callbacks. See
    /// `PersistenceEngine::destroy`.
    pub fn destroy(&mut self) -> Result<SaveOutcome, WiderowError> {
        PersistenceEngine::destroy(self)
    }

    /// Remove this record's row without callbacks.
    pub fn delete(&mut self) -> Result<(), WiderowError> {
        PersistenceEngine::delete_record(self)
    }
}

impl ModelType {
    /// Load one record by key.
    pub fn find_one(self: &Arc<Self>, key: &RowKey) -> Result<Record, WiderowError> {
        PersistenceEngine::find_one(self, key)
    }

    /// Load many records by key.
    pub fn find_many(
        self: &Arc<Self>,
        keys: &[RowKey],
        options: FindOptions,
    ) -> Result<Vec<Record>, WiderowError> {
        PersistenceEngine::find_many(self, keys, options)
    }

    /// Remove whole rows directly, without callbacks.
    pub fn delete_keys(self: &Arc<Self>, keys: &[RowKey]) -> Result<(), WiderowError> {
        PersistenceEngine::delete(self, keys)
    }

    /// Load and destroy records by key, running destroy callbacks.
    pub fn destroy_keys(self: &Arc<Self>, keys: &[RowKey]) -> Result<(), WiderowError> {
        PersistenceEngine::destroy_keys(self, keys)
    }
}

// =============================================================================
// TESTS
// =============================================================================
