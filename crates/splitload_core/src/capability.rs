//! Collaborator capabilities consumed by the pipeline.
//!
//! # Responsibility
//! - Declare the seams to install, resolve, load and activate modules.
//! - Declare the reporting callbacks that observe batch outcomes.
//!
//! # Invariants
//! - Capabilities are `Send + Sync` and shared as `Arc<dyn _>`.
//! - Capabilities report failures as `CapabilityError`; they never panic
//!   the batch.

use crate::model::error::{CapabilityResult, ModuleError};
use crate::model::module::{InstallResult, ModuleBriefInfo, ModuleDescriptor};
use crate::pipeline::load::LoadOutcome;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Fetches or updates one module payload.
pub trait Installer: Send + Sync {
    fn install(
        &self,
        is_start_mode: bool,
        descriptor: &ModuleDescriptor,
    ) -> CapabilityResult<InstallResult>;
}

/// Resolves module descriptors by name.
pub trait ModuleInfoProvider: Send + Sync {
    fn resolve(&self, name: &str) -> Option<ModuleDescriptor>;

    /// Installed directory whose mtime is refreshed after a successful load.
    fn module_dir(&self, _descriptor: &ModuleDescriptor) -> Option<PathBuf> {
        None
    }
}

/// Runtime object resolving one module's code and native libraries.
pub trait CodeUnitLoader: Send + Sync + Debug {
    fn module_name(&self) -> &str;
}

pub type SharedCodeLoader = Arc<dyn CodeUnitLoader>;

/// Builds and releases code-unit loaders.
pub trait ModuleLoader: Send + Sync {
    fn load_code(
        &self,
        name: &str,
        extra_code_paths: &[PathBuf],
        optimized_dir: Option<&Path>,
        native_lib_dir: Option<&Path>,
        dependencies: &[String],
    ) -> CapabilityResult<SharedCodeLoader>;

    fn unload_code(&self, loader: &SharedCodeLoader);

    /// Loads auxiliary resources for an artifact. Failures are non-fatal.
    fn load_resources(&self, artifact_path: &Path) -> CapabilityResult<()>;
}

/// Host-owned handle to a module's runtime instance.
pub struct RuntimeInstance {
    module_name: String,
    inner: Box<dyn Any + Send>,
}

impl RuntimeInstance {
    pub fn new<T: Any + Send>(module_name: impl Into<String>, inner: T) -> Self {
        Self {
            module_name: module_name.into(),
            inner: Box::new(inner),
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl Debug for RuntimeInstance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeInstance")
            .field("module_name", &self.module_name)
            .finish_non_exhaustive()
    }
}

/// Creates runtime instances and attaches them to the host.
///
/// Every method except `create_runtime_instance` is only called on the
/// designated scheduling context.
pub trait Activator: Send + Sync {
    fn create_runtime_instance(
        &self,
        loader: &SharedCodeLoader,
        name: &str,
    ) -> CapabilityResult<RuntimeInstance>;

    fn attach(&self, instance: &RuntimeInstance) -> CapabilityResult<()>;

    fn activate_components(&self, loader: &SharedCodeLoader, name: &str) -> CapabilityResult<()>;

    fn invoke_startup(&self, instance: &RuntimeInstance) -> CapabilityResult<()>;
}

/// Observes install batch outcomes.
pub trait InstallReporter: Send + Sync {
    fn on_start_install_ok(&self, _installed: &[ModuleBriefInfo], _elapsed: Duration) {}

    fn on_start_install_failed(
        &self,
        _installed: &[ModuleBriefInfo],
        _error: &ModuleError,
        _elapsed: Duration,
    ) {
    }

    fn on_deferred_install_ok(&self, _installed: &[ModuleBriefInfo], _elapsed: Duration) {}

    fn on_deferred_install_failed(
        &self,
        _installed: &[ModuleBriefInfo],
        _errors: &[ModuleError],
        _elapsed: Duration,
    ) {
    }
}

/// Receives the aggregated result of one load batch.
pub trait LoadFinishListener: Send + Sync {
    fn on_load_finish(&self, outcome: &LoadOutcome);
}
