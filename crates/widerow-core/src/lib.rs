//! # widerow-core
//!
//! An object-mapping and secondary-indexing layer over a wide-column
//! store.
//!
//! Models are registered once through `ModelType::builder` and shared via
//! `Arc`; record instances carry their attributes, change tracking and
//! lifecycle state. Saves are compiled into ordered mutations (flat
//! scalar columns or super-column groups), every lifecycle transition
//! runs through a callback pipeline, and declared secondary indexes are
//! maintained idempotently on the write path.
//!
//! ## Architectural Constraints
//!
//! - Deterministic: `BTreeMap`/`BTreeSet` everywhere, one clock sample
//!   per save, per-column last-write-wins in the store
//! - Synchronous: no async, no network; the store backends are in-process
//! - Closed write path: every row write goes through the mutation
//!   builder, never directly to a backend

// =============================================================================
// MODULES
// =============================================================================

pub mod attributes;
pub mod callbacks;
pub mod config;
pub mod index;
pub mod model;
pub mod mutation;
pub mod persistence;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{ColumnName, ColumnValue, Row, RowKey, Timestamp, Value, WiderowError};

// =============================================================================
// RE-EXPORTS: Mapping Layer
// =============================================================================

pub use attributes::{AttrValue, AttributeSet};
pub use callbacks::{AfterHook, BeforeHook, CallbackPipeline, LifecycleStage};
pub use config::{AttrKind, AttributeSpec, ModelConfig, DEFAULT_KEY_ATTRIBUTE};
pub use index::{IndexDefinition, IndexEngine, IndexHandle, IndexState};
pub use model::{ModelType, ModelTypeBuilder, Record, RecordState};
pub use mutation::{Mutation, MutationBuilder, WriteMode, WriteStructure};
pub use persistence::{FindOptions, PersistenceEngine, SaveOutcome};

// =============================================================================
// RE-EXPORTS: Store Backends
// =============================================================================

pub use store::{MemoryStore, RedbStore, StoreClient, StoreOp};
