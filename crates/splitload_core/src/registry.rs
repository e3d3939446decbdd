//! Process-wide ledger of loaded modules and cached code loaders.
//!
//! # Responsibility
//! - Track which modules are loaded into this process.
//! - Cache one code-unit loader per module name for future attempts.
//!
//! # Invariants
//! - The loaded set is append-only; there is no unload.
//! - The loader cache is insert-once-wins per module name.
//! - Mutated only under the runtime write lock.

use crate::capability::SharedCodeLoader;
use crate::model::module::LoadedModuleRecord;
use std::collections::BTreeMap;

/// In-process module registry.
#[derive(Debug, Default)]
pub struct Registry {
    loaded: BTreeMap<String, LoadedModuleRecord>,
    loaders: BTreeMap<String, SharedCodeLoader>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    pub fn loaded_record(&self, name: &str) -> Option<&LoadedModuleRecord> {
        self.loaded.get(name)
    }

    /// Returns sorted loaded module names.
    pub fn loaded_names(&self) -> Vec<String> {
        self.loaded.keys().cloned().collect()
    }

    /// Publishes newly loaded records.
    ///
    /// Records for names already present are ignored, so the first record
    /// for a name is kept for the process lifetime. Returns how many records
    /// were inserted.
    pub fn put_loaded(&mut self, records: impl IntoIterator<Item = LoadedModuleRecord>) -> usize {
        let mut inserted = 0;
        for record in records {
            if self.loaded.contains_key(record.name.as_str()) {
                continue;
            }
            self.loaded.insert(record.name.clone(), record);
            inserted += 1;
        }
        inserted
    }

    pub fn cached_loader(&self, name: &str) -> Option<SharedCodeLoader> {
        self.loaders.get(name).cloned()
    }

    /// Merges staged loaders into the cache.
    ///
    /// The first loader merged for a name wins. Losing loaders are returned
    /// so the caller can release them.
    pub fn merge_loaders(
        &mut self,
        loaders: impl IntoIterator<Item = SharedCodeLoader>,
    ) -> Vec<SharedCodeLoader> {
        let mut discarded = Vec::new();
        for loader in loaders {
            let name = loader.module_name().to_string();
            if self.loaders.contains_key(name.as_str()) {
                discarded.push(loader);
                continue;
            }
            self.loaders.insert(name, loader);
        }
        discarded
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    pub fn loader_count(&self) -> usize {
        self.loaders.len()
    }
}
