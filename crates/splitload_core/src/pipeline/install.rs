//! Install batch orchestration.
//!
//! # Responsibility
//! - Drive the installer over an ordered batch of descriptors.
//! - Aggregate results with fail-fast (start) or collect-all (deferred)
//!   policy and report them.
//!
//! # Invariants
//! - Start mode never attempts a descriptor after the first failure.
//! - Deferred mode attempts every descriptor exactly once.
//! - Runs entirely on the calling thread.

use crate::capability::{InstallReporter, Installer};
use crate::config::InstallConfig;
use crate::model::error::ModuleError;
use crate::model::module::{InstallResult, LoadRequest, ModuleBriefInfo, ModuleDescriptor};
use log::{error, info};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

static INSTALL_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Aggregation policy for one install batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// Interactive install blocking a user-visible action.
    Start,
    /// Background provisioning.
    Deferred,
}

impl InstallMode {
    pub fn is_start(self) -> bool {
        matches!(self, Self::Start)
    }

    pub fn stops_on_first_error(self) -> bool {
        self.is_start()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Deferred => "deferred",
        }
    }
}

type PreInstallHook = Box<dyn FnOnce() + Send>;
type CompletedHook = Box<dyn FnOnce(&[InstallResult]) + Send>;
type FailedHook = Box<dyn FnOnce(&[ModuleError]) + Send>;

/// Optional callbacks around one install batch.
#[derive(Default)]
pub struct InstallHooks {
    pre_install: Option<PreInstallHook>,
    on_completed: Option<CompletedHook>,
    on_failed: Option<FailedHook>,
}

impl InstallHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre_install(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.pre_install = Some(Box::new(hook));
        self
    }

    /// Receives the ordered install results when every descriptor succeeded.
    pub fn on_completed(mut self, hook: impl FnOnce(&[InstallResult]) + Send + 'static) -> Self {
        self.on_completed = Some(Box::new(hook));
        self
    }

    /// Receives the collected errors when any descriptor failed.
    pub fn on_failed(mut self, hook: impl FnOnce(&[ModuleError]) + Send + 'static) -> Self {
        self.on_failed = Some(Box::new(hook));
        self
    }
}

/// Aggregated result of one install batch.
#[derive(Debug)]
pub struct InstallOutcome {
    pub mode: InstallMode,
    pub installed: Vec<ModuleBriefInfo>,
    pub results: Vec<InstallResult>,
    pub errors: Vec<ModuleError>,
    pub elapsed: Duration,
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn first_error(&self) -> Option<&ModuleError> {
        self.errors.first()
    }

    /// Load requests for every successfully installed module, in order.
    pub fn load_requests(&self) -> Vec<LoadRequest> {
        self.results
            .iter()
            .map(InstallResult::to_load_request)
            .collect()
    }
}

/// Runs install batches against one installer.
pub struct InstallOrchestrator {
    installer: Arc<dyn Installer>,
    reporter: Option<Arc<dyn InstallReporter>>,
    config: InstallConfig,
}

impl InstallOrchestrator {
    pub fn new(
        installer: Arc<dyn Installer>,
        reporter: Option<Arc<dyn InstallReporter>>,
        config: InstallConfig,
    ) -> Self {
        Self {
            installer,
            reporter,
            config,
        }
    }

    /// Installs `descriptors` in order and reports one aggregated outcome.
    ///
    /// Concurrent calls are not excluded unless
    /// `InstallConfig::serialize_batches` is set.
    pub fn run(
        &self,
        mode: InstallMode,
        descriptors: &[ModuleDescriptor],
        hooks: InstallHooks,
    ) -> InstallOutcome {
        let _serialized = self
            .config
            .serialize_batches
            .then(|| INSTALL_LOCK.lock());

        if let Some(hook) = hooks.pre_install {
            hook();
        }

        let started_at = Instant::now();
        info!(
            "event=install_batch module=install status=start mode={} modules={}",
            mode.as_str(),
            descriptors.len()
        );

        let mut installed = Vec::with_capacity(descriptors.len());
        let mut results = Vec::with_capacity(descriptors.len());
        let mut errors = Vec::new();
        for descriptor in descriptors {
            let brief = ModuleBriefInfo::from_descriptor(descriptor);
            let install_started_at = Instant::now();
            match self.installer.install(mode.is_start(), descriptor) {
                Ok(result) => {
                    let elapsed = install_started_at.elapsed();
                    info!(
                        "event=module_install module=install status=ok name={} flag={:?} duration_ms={}",
                        descriptor.name,
                        result.flag(),
                        elapsed.as_millis()
                    );
                    installed.push(brief.with_flag(result.flag()).with_elapsed(elapsed));
                    results.push(result);
                }
                Err(err) => {
                    error!(
                        "event=module_install module=install status=error name={} error_code={} error={}",
                        descriptor.name,
                        err.code().as_i32(),
                        err
                    );
                    errors.push(ModuleError::from_capability(brief, err));
                    if mode.stops_on_first_error() {
                        break;
                    }
                }
            }
        }

        let elapsed = started_at.elapsed();
        if errors.is_empty() {
            if let Some(hook) = hooks.on_completed {
                hook(&results);
            }
            if let Some(reporter) = &self.reporter {
                match mode {
                    InstallMode::Start => reporter.on_start_install_ok(&installed, elapsed),
                    InstallMode::Deferred => reporter.on_deferred_install_ok(&installed, elapsed),
                }
            }
        } else {
            if let Some(hook) = hooks.on_failed {
                hook(&errors);
            }
            if let Some(reporter) = &self.reporter {
                match mode {
                    InstallMode::Start => {
                        reporter.on_start_install_failed(&installed, &errors[0], elapsed)
                    }
                    InstallMode::Deferred => {
                        reporter.on_deferred_install_failed(&installed, &errors, elapsed)
                    }
                }
            }
        }

        info!(
            "event=install_batch module=install status={} mode={} installed={} failed={} duration_ms={}",
            if errors.is_empty() { "ok" } else { "error" },
            mode.as_str(),
            installed.len(),
            errors.len(),
            elapsed.as_millis()
        );
        InstallOutcome {
            mode,
            installed,
            results,
            errors,
            elapsed,
        }
    }
}
