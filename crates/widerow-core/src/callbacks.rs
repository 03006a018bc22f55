//! # Callback Pipeline
//!
//! Ordered before/after hook execution around the record lifecycle.
//!
//! Hooks are explicit typed handles registered at model construction, not
//! dynamically resolved names. Per stage:
//! - before-hooks run in registration order; the first one returning
//!   `false` vetoes the wrapped operation (silent no-op, not an error)
//! - after-hooks run in registration order and may touch the store (the
//!   index observers live here), so they are fallible
//!
//! Load is an after-only stage by use: the persistence engine never runs
//! before-hooks for it.

use crate::{Record, WiderowError};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// LIFECYCLE STAGES
// =============================================================================

/// The lifecycle stages a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleStage {
    /// Wraps every save, outside the create/update pair.
    Save,
    /// First save of a new record.
    Create,
    /// Save of an already-persisted record.
    Update,
    /// Instance destroy (not class-level delete).
    Destroy,
    /// Materialization from a store row (after-only).
    Load,
}

// =============================================================================
// HOOK HANDLES
// =============================================================================

/// A before-hook: returning `false` vetoes the wrapped operation.
pub type BeforeHook = Arc<dyn Fn(&mut Record) -> Result<bool, WiderowError> + Send + Sync>;

/// An after-hook: runs once the store write (if any) has been issued.
pub type AfterHook = Arc<dyn Fn(&mut Record) -> Result<(), WiderowError> + Send + Sync>;

// =============================================================================
// PIPELINE
// =============================================================================

/// Ordered hook lists per lifecycle stage.
#[derive(Clone, Default)]
pub struct CallbackPipeline {
    before: BTreeMap<LifecycleStage, Vec<BeforeHook>>,
    after: BTreeMap<LifecycleStage, Vec<AfterHook>>,
}

impl std::fmt::Debug for CallbackPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackPipeline")
            .field("before_stages", &self.before.len())
            .field("after_stages", &self.after.len())
            .finish_non_exhaustive()
    }
}

impl CallbackPipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a before-hook to a stage.
    pub fn register_before(&mut self, stage: LifecycleStage, hook: BeforeHook) {
        self.before.entry(stage).or_default().push(hook);
    }

    /// Append an after-hook to a stage.
    pub fn register_after(&mut self, stage: LifecycleStage, hook: AfterHook) {
        self.after.entry(stage).or_default().push(hook);
    }

    /// Run a stage's before-hooks in registration order.
    ///
    /// Returns `Ok(false)` as soon as one hook vetoes; remaining hooks do
    /// not run.
    pub fn run_before(
        &self,
        stage: LifecycleStage,
        record: &mut Record,
    ) -> Result<bool, WiderowError> {
        if let Some(hooks) = self.before.get(&stage) {
            for hook in hooks {
                if !hook(record)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Run a stage's after-hooks in registration order.
    pub fn run_after(
        &self,
        stage: LifecycleStage,
        record: &mut Record,
    ) -> Result<(), WiderowError> {
        if let Some(hooks) = self.after.get(&stage) {
            for hook in hooks {
                hook(record)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::{AttributeSpec, ModelType};
    use std::sync::Mutex;

    fn test_record() -> Record {
        let model = ModelType::builder("people")
            .attribute(AttributeSpec::scalar("name"))
            .connection(Arc::new(MemoryStore::new()))
            .build()
            .expect("model");
        model.instantiate()
    }

    #[test]
    fn before_hooks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = CallbackPipeline::new();

        for tag in ["first", "second"] {
            let log = Arc::clone(&log);
            pipeline.register_before(
                LifecycleStage::Save,
                Arc::new(move |_| {
                    log.lock().expect("lock").push(tag);
                    Ok(true)
                }),
            );
        }

        let mut record = test_record();
        let outcome = pipeline
            .run_before(LifecycleStage::Save, &mut record)
            .expect("run");

        assert!(outcome);
        assert_eq!(*log.lock().expect("lock"), vec!["first", "second"]);
    }

    #[test]
    fn veto_stops_remaining_before_hooks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = CallbackPipeline::new();

        {
            let log = Arc::clone(&log);
            pipeline.register_before(
                LifecycleStage::Save,
                Arc::new(move |_| {
                    log.lock().expect("lock").push("veto");
                    Ok(false)
                }),
            );
        }
        {
            let log = Arc::clone(&log);
            pipeline.register_before(
                LifecycleStage::Save,
                Arc::new(move |_| {
                    log.lock().expect("lock").push("unreached");
                    Ok(true)
                }),
            );
        }

        let mut record = test_record();
        let outcome = pipeline
            .run_before(LifecycleStage::Save, &mut record)
            .expect("run");

        assert!(!outcome);
        assert_eq!(*log.lock().expect("lock"), vec!["veto"]);
    }

    #[test]
    fn stages_are_independent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = CallbackPipeline::new();

        {
            let log = Arc::clone(&log);
            pipeline.register_after(
                LifecycleStage::Create,
                Arc::new(move |_| {
                    log.lock().expect("lock").push("create");
                    Ok(())
                }),
            );
        }

        let mut record = test_record();
        pipeline
            .run_after(LifecycleStage::Update, &mut record)
            .expect("run");
        assert!(log.lock().expect("lock").is_empty());

        pipeline
            .run_after(LifecycleStage::Create, &mut record)
            .expect("run");
        assert_eq!(*log.lock().expect("lock"), vec!["create"]);
    }

    #[test]
    fn after_hook_errors_propagate() {
        let mut pipeline = CallbackPipeline::new();
        pipeline.register_after(
            LifecycleStage::Save,
            Arc::new(|_| Err(WiderowError::IoError("boom".into()))),
        );

        let mut record = test_record();
        let result = pipeline.run_after(LifecycleStage::Save, &mut record);
        assert!(matches!(result, Err(WiderowError::IoError(_))));
    }
}
