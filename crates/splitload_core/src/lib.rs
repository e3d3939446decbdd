//! Install, load and activate feature modules in a running host process.
//! This crate owns the pipeline; packaging, manifests and host attachment
//! mechanics are capabilities supplied by the embedder.

pub mod activation;
pub mod capability;
pub mod config;
pub mod context;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod runtime;

pub use activation::{ActivationCoordinator, ActivationJob, ActivationStep};
pub use capability::{
    Activator, CodeUnitLoader, InstallReporter, Installer, LoadFinishListener, ModuleInfoProvider,
    ModuleLoader, RuntimeInstance, SharedCodeLoader,
};
pub use config::{ConfigError, InstallConfig, PipelineConfig};
pub use context::{
    run_on_context, InlineContext, MainLoop, MainQueue, RendezvousError, SchedulingContext, Task,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::error::{BoxedCause, CapabilityError, CapabilityResult, ErrorCode, ModuleError};
pub use model::module::{
    InstallFlag, InstallResult, LoadRequest, LoadedModuleRecord, ModuleBriefInfo,
    ModuleDescriptor, RequestValidationError,
};
pub use pipeline::install::{InstallHooks, InstallMode, InstallOrchestrator, InstallOutcome};
pub use pipeline::load::{LoadCapabilities, LoadOutcome, LoadPipeline};
pub use registry::Registry;
pub use runtime::ModuleRuntime;

/// Minimal health-check API for embedders.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
