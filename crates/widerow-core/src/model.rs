//! # Model Types and Records
//!
//! The registration surface and the instance type:
//! - `ModelType`: one registered model — immutable configuration, callback
//!   pipeline, index definitions and the default store connection, built
//!   once through `ModelTypeBuilder` and shared through `Arc`
//! - `Record`: one instance — attribute set, lifecycle state, one
//!   `IndexState` slot per declared index, and an optional per-instance
//!   connection override
//!
//! Capabilities that upstream designs mix into one inheritance chain
//! (identity, persistence, connection, observability, indexing) are
//! aggregated here behind narrow components instead.

use crate::callbacks::{AfterHook, BeforeHook, CallbackPipeline, LifecycleStage};
use crate::config::{AttrKind, AttributeSpec, ModelConfig};
use crate::index::{IndexDefinition, IndexEngine, IndexState};
use crate::mutation::WriteStructure;
use crate::store::StoreClient;
use crate::{AttrValue, AttributeSet, RowKey, WiderowError};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// RECORD STATE
// =============================================================================

/// Lifecycle state of a record instance.
///
/// `NEW -> (save) -> PERSISTED -> (destroy) -> DESTROYED`; destroyed is
/// terminal and freezes the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Created in memory, never saved or loaded.
    New,
    /// Saved to or loaded from the store.
    Persisted,
    /// Destroyed; all further mutation is rejected.
    Destroyed,
}

// =============================================================================
// MODEL TYPE
// =============================================================================

/// One registered model type.
///
/// Immutable after construction; instances reference it through `Arc`.
pub struct ModelType {
    config: ModelConfig,
    callbacks: CallbackPipeline,
    connection: Arc<dyn StoreClient>,
    indexes: Vec<Arc<IndexDefinition>>,
}

impl std::fmt::Debug for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelType")
            .field("config", &self.config)
            .field("indexes", &self.indexes.len())
            .finish_non_exhaustive()
    }
}

impl ModelType {
    /// Start building a model type backed by the given column family.
    #[must_use]
    pub fn builder(column_family: impl Into<String>) -> ModelTypeBuilder {
        ModelTypeBuilder {
            column_family: column_family.into(),
            key_attribute: None,
            attributes: Vec::new(),
            connection: None,
            indexes: Vec::new(),
            before_hooks: Vec::new(),
            after_hooks: Vec::new(),
        }
    }

    /// The model's immutable configuration.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The model's callback pipeline.
    #[must_use]
    pub fn callbacks(&self) -> &CallbackPipeline {
        &self.callbacks
    }

    /// The class-wide default store connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn StoreClient> {
        &self.connection
    }

    /// Declared index definitions in declaration order.
    #[must_use]
    pub fn indexes(&self) -> &[Arc<IndexDefinition>] {
        &self.indexes
    }

    /// Look up an index definition by name.
    #[must_use]
    pub fn index_definition(&self, name: &str) -> Option<&Arc<IndexDefinition>> {
        self.indexes.iter().find(|def| def.name() == name)
    }

    /// Create a new in-memory instance of this model.
    ///
    /// The record starts `New` with one empty `IndexState` slot per
    /// declared index.
    #[must_use]
    pub fn instantiate(self: &Arc<Self>) -> Record {
        let index_states = self
            .indexes
            .iter()
            .map(|def| (def.name().to_string(), IndexState::new()))
            .collect();
        Record {
            model: Arc::clone(self),
            attributes: AttributeSet::new(),
            state: RecordState::New,
            index_states,
            connection_override: None,
        }
    }
}

// =============================================================================
// MODEL TYPE BUILDER
// =============================================================================

/// Builder for `ModelType`.
///
/// Index observers are wired into the pipeline ahead of user hooks, so
/// user after-create/after-update code always observes reconciled index
/// rows.
pub struct ModelTypeBuilder {
    column_family: String,
    key_attribute: Option<String>,
    attributes: Vec<AttributeSpec>,
    connection: Option<Arc<dyn StoreClient>>,
    indexes: Vec<IndexDefinition>,
    before_hooks: Vec<(LifecycleStage, BeforeHook)>,
    after_hooks: Vec<(LifecycleStage, AfterHook)>,
}

impl ModelTypeBuilder {
    /// Override the identity-key attribute name (default `"key"`).
    #[must_use]
    pub fn key_attribute(mut self, name: impl Into<String>) -> Self {
        self.key_attribute = Some(name.into());
        self
    }

    /// Declare an attribute. Declaration order is write-projection order.
    #[must_use]
    pub fn attribute(mut self, spec: AttributeSpec) -> Self {
        self.attributes.push(spec);
        self
    }

    /// Set the class-wide default store connection.
    #[must_use]
    pub fn connection(mut self, store: Arc<dyn StoreClient>) -> Self {
        self.connection = Some(store);
        self
    }

    /// Declare a named index over this model.
    #[must_use]
    pub fn index(mut self, definition: IndexDefinition) -> Self {
        self.indexes.push(definition);
        self
    }

    /// Register a before-hook for a lifecycle stage.
    #[must_use]
    pub fn before(mut self, stage: LifecycleStage, hook: BeforeHook) -> Self {
        self.before_hooks.push((stage, hook));
        self
    }

    /// Register an after-hook for a lifecycle stage.
    #[must_use]
    pub fn after(mut self, stage: LifecycleStage, hook: AfterHook) -> Self {
        self.after_hooks.push((stage, hook));
        self
    }

    /// Validate and build the immutable model type.
    pub fn build(self) -> Result<Arc<ModelType>, WiderowError> {
        let config = ModelConfig::new(self.column_family, self.key_attribute, self.attributes)?;

        let connection = self.connection.ok_or_else(|| {
            WiderowError::InvalidArgument("model requires a store connection".into())
        })?;

        let mut indexes: Vec<Arc<IndexDefinition>> = Vec::with_capacity(self.indexes.len());
        for def in self.indexes {
            Self::validate_index(&config, &def, &indexes)?;
            indexes.push(Arc::new(def));
        }

        let mut callbacks = CallbackPipeline::new();
        for def in &indexes {
            let observer = Arc::clone(def);
            callbacks.register_after(
                LifecycleStage::Load,
                Arc::new(move |record| IndexEngine::baseline(&observer, record)),
            );
            let observer = Arc::clone(def);
            callbacks.register_after(
                LifecycleStage::Create,
                Arc::new(move |record| IndexEngine::create(&observer, record)),
            );
            let observer = Arc::clone(def);
            callbacks.register_after(
                LifecycleStage::Update,
                Arc::new(move |record| IndexEngine::update(&observer, record)),
            );
        }
        for (stage, hook) in self.before_hooks {
            callbacks.register_before(stage, hook);
        }
        for (stage, hook) in self.after_hooks {
            callbacks.register_after(stage, hook);
        }

        Ok(Arc::new(ModelType {
            config,
            callbacks,
            connection,
            indexes,
        }))
    }

    fn validate_index(
        config: &ModelConfig,
        def: &IndexDefinition,
        accepted: &[Arc<IndexDefinition>],
    ) -> Result<(), WiderowError> {
        if def.name().is_empty() || def.column_family().is_empty() {
            return Err(WiderowError::InvalidArgument(
                "index name and column family must be non-empty".into(),
            ));
        }
        if accepted.iter().any(|prior| prior.name() == def.name()) {
            return Err(WiderowError::InvalidArgument(format!(
                "duplicate index declaration '{}'",
                def.name()
            )));
        }
        for attr in [def.source(), def.identifier_attribute(config)] {
            match config.spec(attr) {
                Some(spec) if spec.kind == AttrKind::Scalar => {}
                Some(_) => {
                    return Err(WiderowError::InvalidArgument(format!(
                        "index '{}' references grouped attribute '{attr}'",
                        def.name()
                    )));
                }
                None => {
                    return Err(WiderowError::InvalidArgument(format!(
                        "index '{}' references undeclared attribute '{attr}'",
                        def.name()
                    )));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// One model instance: attributes plus persistence metadata.
pub struct Record {
    model: Arc<ModelType>,
    attributes: AttributeSet,
    state: RecordState,
    index_states: BTreeMap<String, IndexState>,
    connection_override: Option<Arc<dyn StoreClient>>,
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("column_family", &self.model.config().column_family())
            .field("state", &self.state)
            .field("attributes", &self.attributes)
            .field("index_states", &self.index_states)
            .finish_non_exhaustive()
    }
}

impl Record {
    /// The model type this record belongs to.
    #[must_use]
    pub fn model(&self) -> &Arc<ModelType> {
        &self.model
    }

    /// The model's configuration.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        self.model.config()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Check whether the record has never been saved or loaded.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.state == RecordState::New
    }

    /// Check whether the record has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state == RecordState::Destroyed
    }

    pub(crate) fn set_state(&mut self, state: RecordState) {
        self.state = state;
    }

    /// The record's attribute set.
    #[must_use]
    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut AttributeSet {
        &mut self.attributes
    }

    /// Assign a declared attribute.
    ///
    /// `None` is an explicit nil (column deletion on the next save).
    /// Rejects undeclared names, kind mismatches, and any assignment on a
    /// destroyed (frozen) record.
    pub fn set(&mut self, name: &str, value: Option<AttrValue>) -> Result<(), WiderowError> {
        if self.is_destroyed() {
            return Err(WiderowError::FrozenRecord);
        }
        let spec = self
            .config()
            .spec(name)
            .ok_or_else(|| WiderowError::UnknownAttribute(name.to_string()))?;
        match (&value, spec.kind) {
            (None, _)
            | (Some(AttrValue::Scalar(_)), AttrKind::Scalar)
            | (Some(AttrValue::Group(_)), AttrKind::Group) => {}
            _ => {
                return Err(WiderowError::InvalidArgument(format!(
                    "value shape does not match declared kind of attribute '{name}'"
                )));
            }
        }
        self.attributes.set(name, value);
        Ok(())
    }

    /// Assign a scalar attribute from a string.
    pub fn set_scalar(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), WiderowError> {
        self.set(name, Some(AttrValue::scalar(value)))
    }

    /// Explicitly nil an attribute (deletes the column on the next save).
    pub fn set_nil(&mut self, name: &str) -> Result<(), WiderowError> {
        self.set(name, None)
    }

    /// Read an attribute value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Read a scalar attribute value.
    #[must_use]
    pub fn scalar(&self, name: &str) -> Option<&crate::Value> {
        self.attributes.scalar(name)
    }

    /// Resolve the identity key from the key attribute, if set.
    #[must_use]
    pub fn key(&self) -> Option<RowKey> {
        self.attributes
            .scalar(self.config().key_attribute())
            .map(|v| RowKey::new(v.as_str()))
    }

    /// The store connection: instance override when set, else the model's
    /// class-wide default.
    #[must_use]
    pub fn connection(&self) -> Arc<dyn StoreClient> {
        self.connection_override
            .clone()
            .unwrap_or_else(|| Arc::clone(self.model.connection()))
    }

    /// Override the store connection for this instance only.
    pub fn set_connection(&mut self, store: Arc<dyn StoreClient>) {
        self.connection_override = Some(store);
    }

    /// Tracked index state for a declared index.
    #[must_use]
    pub fn index_state(&self, name: &str) -> Option<&IndexState> {
        self.index_states.get(name)
    }

    pub(crate) fn index_state_mut(&mut self, name: &str) -> Option<&mut IndexState> {
        self.index_states.get_mut(name)
    }

    /// Project attributes for a row write, in declaration order.
    ///
    /// The key attribute is excluded: it addresses the row. With
    /// `only_changed` the projection covers attributes assigned since the
    /// last load or save (partial update); otherwise every defined
    /// attribute (full write of a new record).
    #[must_use]
    pub fn write_structure(&self, only_changed: bool) -> WriteStructure {
        let config = self.config();
        let mut structure = WriteStructure::new();
        for spec in config.attributes() {
            if spec.name == config.key_attribute() {
                continue;
            }
            let include = if only_changed {
                self.attributes.is_changed(&spec.name)
            } else {
                self.attributes.is_defined(&spec.name)
            };
            if include {
                structure.push((spec.name.clone(), self.attributes.get(&spec.name).cloned()));
            }
        }
        structure
    }
}

// =============================================================================
// TESTS
// =============================================================================
