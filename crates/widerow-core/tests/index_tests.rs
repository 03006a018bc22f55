//! # Secondary Index Tests
//!
//! Index maintenance through the save lifecycle and lookups through
//! `IndexHandle`.

use std::sync::Arc;
use widerow_core::{
    AttributeSpec, ColumnName, IndexDefinition, MemoryStore, ModelType, Record, RowKey,
    StoreClient, StoreOp, Value,
};

fn indexed_people(store: Arc<MemoryStore>) -> Arc<ModelType> {
    ModelType::builder("people")
        .attribute(AttributeSpec::scalar("name"))
        .attribute(AttributeSpec::scalar("city"))
        .connection(store)
        .index(IndexDefinition::new("by_city", "city", "people_by_city"))
        .build()
        .expect("model")
}

fn save_person(model: &Arc<ModelType>, key: &str, city: Option<&str>) -> Record {
    let mut record = model.instantiate();
    record.set_scalar("key", key).expect("set");
    record.set_scalar("name", key).expect("set");
    if let Some(city) = city {
        record.set_scalar("city", city).expect("set");
    }
    record.save().expect("save");
    record
}

// =============================================================================
// WRITE-PATH MAINTENANCE
// =============================================================================

#[test]
fn create_populates_index() {
    let store = Arc::new(MemoryStore::new());
    let model = indexed_people(Arc::clone(&store));
    save_person(&model, "alice", Some("paris"));
    save_person(&model, "bob", Some("paris"));
    save_person(&model, "carol", Some("rome"));

    let handle = model.index("by_city").expect("handle");
    assert_eq!(
        handle.keys(&[Value::new("paris")]).expect("keys"),
        vec![RowKey::new("alice"), RowKey::new("bob")]
    );
    assert_eq!(
        handle.keys(&[Value::new("rome")]).expect("keys"),
        vec![RowKey::new("carol")]
    );
}

#[test]
fn nil_source_creates_no_entry() {
    let store = Arc::new(MemoryStore::new());
    let model = indexed_people(Arc::clone(&store));
    save_person(&model, "alice", None);

    let handle = model.index("by_city").expect("handle");
    let row = store
        .get("people_by_city", &RowKey::new("alice"))
        .expect("get");
    assert!(row.is_empty());
    assert!(handle.objects(&[Value::new("paris")]).expect("objects").is_empty());
}

#[test]
fn changing_source_moves_entry() {
    let store = Arc::new(MemoryStore::new());
    let model = indexed_people(Arc::clone(&store));
    let mut record = save_person(&model, "alice", Some("paris"));

    record.set_scalar("city", "rome").expect("set");
    record.save().expect("save");

    let handle = model.index("by_city").expect("handle");
    assert!(handle.keys(&[Value::new("paris")]).expect("keys").is_empty());
    assert_eq!(
        handle.keys(&[Value::new("rome")]).expect("keys"),
        vec![RowKey::new("alice")]
    );
}

#[test]
fn moving_an_entry_removes_before_creating() {
    let store = Arc::new(MemoryStore::new());
    let model = indexed_people(Arc::clone(&store));
    let mut record = save_person(&model, "alice", Some("paris"));
    store.clear_journal();

    record.set_scalar("city", "rome").expect("set");
    record.save().expect("save");

    // The old entry must come out before the replacement goes in; the
    // reverse order would let two index rows claim the record at once.
    let index_ops: Vec<StoreOp> = store
        .journal()
        .into_iter()
        .filter(|op| {
            matches!(
                op,
                StoreOp::Insert { column_family, .. } | StoreOp::Remove { column_family, .. }
                    if column_family == "people_by_city"
            )
        })
        .collect();
    assert_eq!(index_ops.len(), 2);
    assert!(matches!(
        &index_ops[0],
        StoreOp::Remove { key, .. } if key == &RowKey::new("paris")
    ));
    assert!(matches!(
        &index_ops[1],
        StoreOp::Insert { key, .. } if key == &RowKey::new("rome")
    ));
}

#[test]
fn unrelated_update_leaves_index_untouched() {
    let store = Arc::new(MemoryStore::new());
    let model = indexed_people(Arc::clone(&store));
    let mut record = save_person(&model, "alice", Some("paris"));
    store.clear_journal();

    record.set_scalar("name", "Alicia").expect("set");
    record.save().expect("save");

    // One row write, no index traffic.
    let journal = store.journal();
    assert_eq!(journal.len(), 1);
}

#[test]
fn loaded_record_reconciles_against_stored_entry() {
    let store = Arc::new(MemoryStore::new());
    let model = indexed_people(Arc::clone(&store));
    save_person(&model, "alice", Some("paris"));

    // Load in a fresh instance: the index state is baselined from the
    // stored row, so moving the source replaces rather than duplicates.
    let mut loaded = model.find_one(&RowKey::new("alice")).expect("find");
    loaded.set_scalar("city", "rome").expect("set");
    loaded.save().expect("save");

    let handle = model.index("by_city").expect("handle");
    assert!(handle.keys(&[Value::new("paris")]).expect("keys").is_empty());
    assert_eq!(
        handle.keys(&[Value::new("rome")]).expect("keys"),
        vec![RowKey::new("alice")]
    );
}

#[test]
fn custom_identifier_attribute_names_the_column() {
    let store = Arc::new(MemoryStore::new());
    let model = ModelType::builder("people")
        .attribute(AttributeSpec::scalar("name"))
        .attribute(AttributeSpec::scalar("city"))
        .connection(Arc::clone(&store) as Arc<dyn StoreClient>)
        .index(IndexDefinition::new("by_city", "city", "people_by_city").with_identifier("name"))
        .build()
        .expect("model");

    let mut record = model.instantiate();
    record.set_scalar("key", "u1").expect("set");
    record.set_scalar("name", "Alice").expect("set");
    record.set_scalar("city", "paris").expect("set");
    record.save().expect("save");

    let row = store
        .get("people_by_city", &RowKey::new("paris"))
        .expect("get");
    assert!(row.contains_key(&ColumnName::new("Alice")));

    // The cell still carries the record key.
    let handle = model.index("by_city").expect("handle");
    assert_eq!(
        handle.keys(&[Value::new("paris")]).expect("keys"),
        vec![RowKey::new("u1")]
    );
}

// =============================================================================
// READ PATH
// =============================================================================

#[test]
fn objects_loads_indexed_records() {
    let store = Arc::new(MemoryStore::new());
    let model = indexed_people(Arc::clone(&store));
    save_person(&model, "alice", Some("paris"));
    save_person(&model, "bob", Some("rome"));

    let handle = model.index("by_city").expect("handle");
    let records = handle
        .objects(&[Value::new("paris"), Value::new("rome")])
        .expect("objects");
    let keys: Vec<_> = records.iter().filter_map(Record::key).collect();
    assert_eq!(keys, vec![RowKey::new("alice"), RowKey::new("bob")]);
}

#[test]
fn stale_entries_are_skipped_after_destroy() {
    let store = Arc::new(MemoryStore::new());
    let model = indexed_people(Arc::clone(&store));
    save_person(&model, "alice", Some("paris"));
    let mut bob = save_person(&model, "bob", Some("paris"));

    // Destroy removes the data row but leaves the index entry behind.
    bob.destroy().expect("destroy");
    let handle = model.index("by_city").expect("handle");
    assert_eq!(
        handle.keys(&[Value::new("paris")]).expect("keys"),
        vec![RowKey::new("alice"), RowKey::new("bob")]
    );

    let records = handle.objects(&[Value::new("paris")]).expect("objects");
    let keys: Vec<_> = records.iter().filter_map(Record::key).collect();
    assert_eq!(keys, vec![RowKey::new("alice")]);
}
