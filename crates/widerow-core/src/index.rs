//! # Secondary Index Maintenance
//!
//! Write-path index upkeep and read-path lookups:
//! - `IndexDefinition`: a declared index — source attribute, identifier
//!   attribute and the backing column family
//! - `IndexState`: what a record believes the store currently holds for it
//!   in one index, making create and remove idempotent
//! - `IndexEngine`: the create/remove/update operations wired into the
//!   callback pipeline as after-hooks
//! - `IndexHandle`: lookups against an index, merging rows per source
//!   value and deduplicating identifiers
//!
//! An index row lives in the index's own column family: the row key is the
//! source value, each column name is an identifier value and each cell is
//! the indexed record's key.

use crate::model::{ModelType, Record};
use crate::types::{ColumnName, ColumnValue, Row, RowKey, Value, WiderowError};
use crate::ModelConfig;
use std::collections::BTreeSet;
use std::sync::Arc;

// =============================================================================
// INDEX DEFINITION
// =============================================================================

/// A declared secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    name: String,
    source: String,
    indexed_identifier: Option<String>,
    column_family: String,
}

impl IndexDefinition {
    /// Declare an index named `name` over scalar attribute `source`,
    /// stored in `column_family`.
    ///
    /// The identifier attribute defaults to the model's key attribute.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        column_family: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            indexed_identifier: None,
            column_family: column_family.into(),
        }
    }

    /// Use `attribute` instead of the key attribute as the per-record
    /// identifier (the index row's column name).
    #[must_use]
    pub fn with_identifier(mut self, attribute: impl Into<String>) -> Self {
        self.indexed_identifier = Some(attribute.into());
        self
    }

    /// The index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attribute whose value addresses the index row.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The column family holding the index rows.
    #[must_use]
    pub fn column_family(&self) -> &str {
        &self.column_family
    }

    /// Resolve the identifier attribute, falling back to the model's key
    /// attribute.
    #[must_use]
    pub fn identifier_attribute<'a>(&'a self, config: &'a ModelConfig) -> &'a str {
        self.indexed_identifier
            .as_deref()
            .unwrap_or_else(|| config.key_attribute())
    }
}

// =============================================================================
// INDEX STATE
// =============================================================================

/// Per-record, per-index snapshot of what the store holds.
///
/// `create` records what it wrote here; `remove` only touches the store
/// when both fields are set, and `update` compares live values against
/// this snapshot to decide whether anything changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexState {
    source: Option<Value>,
    identifier: Option<Value>,
}

impl IndexState {
    /// An empty snapshot: nothing known to be in the store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The source value last written to the index, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Value> {
        self.source.as_ref()
    }

    /// The identifier value last written to the index, if any.
    #[must_use]
    pub fn identifier(&self) -> Option<&Value> {
        self.identifier.as_ref()
    }

    pub(crate) fn set(&mut self, source: Option<Value>, identifier: Option<Value>) {
        self.source = source;
        self.identifier = identifier;
    }

    pub(crate) fn clear(&mut self) {
        self.source = None;
        self.identifier = None;
    }
}

// =============================================================================
// INDEX ENGINE
// =============================================================================

/// Index write-path operations.
///
/// All three run as after-hooks ahead of user hooks: `baseline` after
/// load, `create` after create, `update` after update. Destroy does not
/// remove index entries, so stale identifiers can linger in index rows;
/// the read path tolerates them through `FindOptions::allow_missing`.
pub struct IndexEngine;

impl IndexEngine {
    /// The record's live source value for this index.
    #[must_use]
    pub fn source_for<'a>(def: &IndexDefinition, record: &'a Record) -> Option<&'a Value> {
        record.scalar(def.source())
    }

    /// The record's live identifier value for this index.
    #[must_use]
    pub fn indexed_identifier_for<'a>(
        def: &IndexDefinition,
        record: &'a Record,
    ) -> Option<&'a Value> {
        let attribute = def.identifier_attribute(record.config()).to_string();
        record.scalar(&attribute)
    }

    /// Seed the record's index state from its live attribute values.
    ///
    /// Runs after load so a later update compares against what the store
    /// actually holds for the loaded row.
    pub fn baseline(def: &IndexDefinition, record: &mut Record) -> Result<(), WiderowError> {
        let source = Self::source_for(def, record).cloned();
        let identifier = Self::indexed_identifier_for(def, record).cloned();
        if let Some(state) = record.index_state_mut(def.name()) {
            state.set(source, identifier);
        }
        Ok(())
    }

    /// Write the record's index entry and update its index state.
    ///
    /// A nil source is a no-op. A nil identifier with a non-nil source is
    /// `UndefinedKey`: the entry cannot be addressed.
    pub fn create(def: &IndexDefinition, record: &mut Record) -> Result<(), WiderowError> {
        let Some(source) = Self::source_for(def, record).cloned() else {
            return Ok(());
        };
        let identifier = Self::indexed_identifier_for(def, record)
            .cloned()
            .ok_or(WiderowError::UndefinedKey)?;
        let record_key = record.key().ok_or(WiderowError::UndefinedKey)?;

        let mut row = Row::new();
        row.insert(
            ColumnName::new(identifier.as_str()),
            ColumnValue::Scalar(Value::new(record_key.as_str())),
        );
        record
            .connection()
            .insert(def.column_family(), &RowKey::new(source.as_str()), row, None)?;

        if let Some(state) = record.index_state_mut(def.name()) {
            state.set(Some(source), Some(identifier));
        }
        Ok(())
    }

    /// Delete the record's index entry as recorded in its index state.
    ///
    /// A partial or empty snapshot means nothing known to remove; the
    /// state is cleared either way.
    pub fn remove(def: &IndexDefinition, record: &mut Record) -> Result<(), WiderowError> {
        let snapshot = match record.index_state(def.name()) {
            Some(state) => state.clone(),
            None => return Ok(()),
        };
        if let (Some(source), Some(identifier)) = (snapshot.source(), snapshot.identifier()) {
            let mut columns = BTreeSet::new();
            columns.insert(ColumnName::new(identifier.as_str()));
            record.connection().remove(
                def.column_family(),
                &RowKey::new(source.as_str()),
                Some(&columns),
                None,
            )?;
        }
        if let Some(state) = record.index_state_mut(def.name()) {
            state.clear();
        }
        Ok(())
    }

    /// Reconcile the index entry with the record's live values.
    ///
    /// No store traffic when live source and identifier match the
    /// snapshot; otherwise the old entry is removed and a new one created.
    pub fn update(def: &IndexDefinition, record: &mut Record) -> Result<(), WiderowError> {
        let live_source = Self::source_for(def, record).cloned();
        let live_identifier = Self::indexed_identifier_for(def, record).cloned();
        if let Some(state) = record.index_state(def.name()) {
            if state.source() == live_source.as_ref()
                && state.identifier() == live_identifier.as_ref()
            {
                return Ok(());
            }
        }
        Self::remove(def, record)?;
        Self::create(def, record)
    }
}

// =============================================================================
// INDEX HANDLE
// =============================================================================

/// Read-path access to one declared index.
pub struct IndexHandle {
    model: Arc<ModelType>,
    def: Arc<IndexDefinition>,
}

impl ModelType {
    /// Get a read handle for a declared index, if one by that name exists.
    #[must_use]
    pub fn index(self: &Arc<Self>, name: &str) -> Option<IndexHandle> {
        self.index_definition(name).map(|def| IndexHandle {
            model: Arc::clone(self),
            def: Arc::clone(def),
        })
    }
}

impl IndexHandle {
    /// The index definition behind this handle.
    #[must_use]
    pub fn definition(&self) -> &IndexDefinition {
        &self.def
    }

    /// Fetch and merge the raw index rows for the given source values.
    pub fn get(&self, sources: &[Value]) -> Result<Row, WiderowError> {
        let keys: Vec<RowKey> = sources.iter().map(|v| RowKey::new(v.as_str())).collect();
        let rows = self
            .model
            .connection()
            .multi_get(self.def.column_family(), &keys)?;
        let mut merged = Row::new();
        for (_, row) in rows {
            merged.extend(row);
        }
        Ok(merged)
    }

    /// Record keys indexed under the given source values.
    ///
    /// Entries are visited in column-name order; duplicate keys keep their
    /// earliest position.
    pub fn keys(&self, sources: &[Value]) -> Result<Vec<RowKey>, WiderowError> {
        let row = self.get(sources)?;
        let mut seen = BTreeSet::new();
        let mut keys = Vec::new();
        for value in row.values() {
            if let ColumnValue::Scalar(key) = value {
                if seen.insert(key.clone()) {
                    keys.push(RowKey::new(key.as_str()));
                }
            }
        }
        Ok(keys)
    }

    /// Load the records indexed under the given source values.
    ///
    /// Stale index entries pointing at deleted rows are skipped rather
    /// than reported as `RecordNotFound`. An empty key set short-circuits
    /// without touching the store.
    pub fn objects(&self, sources: &[Value]) -> Result<Vec<Record>, WiderowError> {
        let keys = self.keys(sources)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.model
            .find_many(&keys, crate::persistence::FindOptions { allow_missing: true })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeSpec;
    use crate::store::{MemoryStore, StoreClient, StoreOp};

    fn indexed_model(store: Arc<MemoryStore>) -> Arc<ModelType> {
        ModelType::builder("people")
            .attribute(AttributeSpec::scalar("name"))
            .attribute(AttributeSpec::scalar("city"))
            .connection(store)
            .index(IndexDefinition::new("by_city", "city", "people_by_city"))
            .build()
            .expect("model")
    }

    fn record_with(
        model: &Arc<ModelType>,
        key: &str,
        city: Option<&str>,
    ) -> Record {
        let mut record = model.instantiate();
        record.set_scalar("key", key).expect("set");
        if let Some(city) = city {
            record.set_scalar("city", city).expect("set");
        }
        record
    }

    #[test]
    fn identifier_defaults_to_key_attribute() {
        let def = IndexDefinition::new("by_city", "city", "people_by_city");
        let config = ModelConfig::new("people", None, vec![AttributeSpec::scalar("city")])
            .expect("config");
        assert_eq!(def.identifier_attribute(&config), "key");

        let def = def.with_identifier("name");
        assert_eq!(def.identifier_attribute(&config), "name");
    }

    #[test]
    fn create_writes_entry_and_records_state() {
        let store = Arc::new(MemoryStore::new());
        let model = indexed_model(Arc::clone(&store));
        let def = Arc::clone(model.index_definition("by_city").expect("def"));
        let mut record = record_with(&model, "alice", Some("paris"));

        IndexEngine::create(&def, &mut record).expect("create");

        let row = store
            .get("people_by_city", &RowKey::new("paris"))
            .expect("get");
        assert_eq!(
            row.get(&ColumnName::new("alice")),
            Some(&ColumnValue::Scalar(Value::new("alice")))
        );
        let state = record.index_state("by_city").expect("slot");
        assert_eq!(state.source(), Some(&Value::new("paris")));
        assert_eq!(state.identifier(), Some(&Value::new("alice")));
    }

    #[test]
    fn create_with_nil_source_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let model = indexed_model(Arc::clone(&store));
        let mut record = record_with(&model, "alice", None);
        let def = Arc::clone(model.index_definition("by_city").expect("def"));

        IndexEngine::create(&def, &mut record).expect("create");
        assert!(store.journal().is_empty());
    }

    #[test]
    fn create_without_identifier_is_undefined_key() {
        let store = Arc::new(MemoryStore::new());
        let model = indexed_model(Arc::clone(&store));
        let def = Arc::clone(model.index_definition("by_city").expect("def"));
        let mut record = model.instantiate();
        record.set_scalar("city", "paris").expect("set");

        let result = IndexEngine::create(&def, &mut record);
        assert!(matches!(result, Err(WiderowError::UndefinedKey)));
    }

    #[test]
    fn remove_only_acts_on_complete_state() {
        let store = Arc::new(MemoryStore::new());
        let model = indexed_model(Arc::clone(&store));
        let def = Arc::clone(model.index_definition("by_city").expect("def"));
        let mut record = record_with(&model, "alice", Some("paris"));

        // Empty state: no store traffic.
        IndexEngine::remove(&def, &mut record).expect("remove");
        assert!(store.journal().is_empty());

        IndexEngine::create(&def, &mut record).expect("create");
        store.clear_journal();
        IndexEngine::remove(&def, &mut record).expect("remove");

        let journal = store.journal();
        assert_eq!(journal.len(), 1);
        assert!(matches!(&journal[0], StoreOp::Remove { column_family, .. }
            if column_family == "people_by_city"));
        let state = record.index_state("by_city").expect("slot");
        assert!(state.source().is_none());
    }

    #[test]
    fn update_skips_store_when_nothing_changed() {
        let store = Arc::new(MemoryStore::new());
        let model = indexed_model(Arc::clone(&store));
        let def = Arc::clone(model.index_definition("by_city").expect("def"));
        let mut record = record_with(&model, "alice", Some("paris"));

        IndexEngine::create(&def, &mut record).expect("create");
        store.clear_journal();

        IndexEngine::update(&def, &mut record).expect("update");
        assert!(store.journal().is_empty());
    }

    #[test]
    fn update_replaces_entry_when_source_changes() {
        let store = Arc::new(MemoryStore::new());
        let model = indexed_model(Arc::clone(&store));
        let def = Arc::clone(model.index_definition("by_city").expect("def"));
        let mut record = record_with(&model, "alice", Some("paris"));
        IndexEngine::create(&def, &mut record).expect("create");

        record.set_scalar("city", "rome").expect("set");
        IndexEngine::update(&def, &mut record).expect("update");

        let old = store
            .get("people_by_city", &RowKey::new("paris"))
            .expect("get");
        assert!(old.is_empty());
        let new = store
            .get("people_by_city", &RowKey::new("rome"))
            .expect("get");
        assert!(new.contains_key(&ColumnName::new("alice")));
    }

    #[test]
    fn keys_sorted_by_column_name_and_deduplicated() {
        let store = Arc::new(MemoryStore::new());
        let model = indexed_model(Arc::clone(&store));

        // Two entries map to the same record key; duplicates keep their
        // earliest position.
        let mut row = Row::new();
        row.insert(
            ColumnName::new("0000-id1"),
            ColumnValue::Scalar(Value::new("id1")),
        );
        row.insert(
            ColumnName::new("0001-id2"),
            ColumnValue::Scalar(Value::new("id2")),
        );
        row.insert(
            ColumnName::new("aaaa-id1"),
            ColumnValue::Scalar(Value::new("id1")),
        );
        store
            .insert("people_by_city", &RowKey::new("paris"), row, None)
            .expect("insert");

        let handle = model.index("by_city").expect("handle");
        let keys = handle.keys(&[Value::new("paris")]).expect("keys");
        assert_eq!(keys, vec![RowKey::new("id1"), RowKey::new("id2")]);
    }

    #[test]
    fn objects_short_circuits_on_empty_index() {
        let store = Arc::new(MemoryStore::new());
        let model = indexed_model(Arc::clone(&store));

        let handle = model.index("by_city").expect("handle");
        store.clear_journal();
        let records = handle.objects(&[Value::new("nowhere")]).expect("objects");
        assert!(records.is_empty());
    }
}
