//! Shared module runtime state.
//!
//! # Responsibility
//! - Own the batch guard that serializes load batches.
//! - Own the registry, written only when a batch publishes.
//! - Expose the process-wide runtime instance.
//!
//! # Invariants
//! - At most one load batch per runtime holds the batch guard at any time.
//! - Read accessors never wait on the batch guard, so activation code may
//!   query the runtime while its own batch is in flight.
//! - A batch publishes its records and loaders under one write lock, so
//!   readers never observe a batch half-way through publishing.

use crate::capability::SharedCodeLoader;
use crate::model::module::LoadedModuleRecord;
use crate::registry::Registry;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;

static GLOBAL_RUNTIME: Lazy<ModuleRuntime> = Lazy::new(ModuleRuntime::new);

#[derive(Debug, Default)]
struct RuntimeState {
    batch: Mutex<()>,
    registry: RwLock<Registry>,
}

/// Cloneable handle to one registry and its batch guard.
#[derive(Debug, Clone, Default)]
pub struct ModuleRuntime {
    state: Arc<RuntimeState>,
}

impl ModuleRuntime {
    /// Creates an isolated runtime, mainly for embedding and tests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide runtime shared by every pipeline that does not bring
    /// its own.
    pub fn global() -> &'static ModuleRuntime {
        &GLOBAL_RUNTIME
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.state.registry.read().is_loaded(name)
    }

    pub fn loaded_names(&self) -> Vec<String> {
        self.state.registry.read().loaded_names()
    }

    pub fn cached_loader(&self, name: &str) -> Option<SharedCodeLoader> {
        self.state.registry.read().cached_loader(name)
    }

    /// Seeds the loader cache with a loader built outside the pipeline,
    /// e.g. for modules whose code ships with the host.
    ///
    /// Returns `false` and keeps the existing entry when the name is
    /// already cached.
    pub fn register_loader(&self, loader: SharedCodeLoader) -> bool {
        self.state
            .registry
            .write()
            .merge_loaders([loader])
            .is_empty()
    }

    pub fn loader_count(&self) -> usize {
        self.state.registry.read().loader_count()
    }

    /// Enters the batch exclusion section.
    pub(crate) fn begin_batch(&self) -> MutexGuard<'_, ()> {
        self.state.batch.lock()
    }

    /// Publishes one batch's records and fresh loaders atomically.
    ///
    /// Returns the loaders that lost the merge against an existing entry.
    pub(crate) fn publish(
        &self,
        records: Vec<LoadedModuleRecord>,
        loaders: Vec<SharedCodeLoader>,
    ) -> Vec<SharedCodeLoader> {
        let mut registry = self.state.registry.write();
        registry.put_loaded(records);
        registry.merge_loaders(loaders)
    }

    pub fn same_runtime(&self, other: &ModuleRuntime) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}
