//! Ordered activation of one module on the designated context.
//!
//! # Responsibility
//! - Run resource loading, attach, component activation and startup in
//!   strict order for one module.
//! - Move that unit onto the designated context and wait for its result.
//!
//! # Invariants
//! - Resource loading failure is logged and never fatal.
//! - The first fatal failure aborts the remaining steps for that module only.
//! - No state survives one activation beyond the job passed in.

use crate::capability::{Activator, ModuleLoader, RuntimeInstance, SharedCodeLoader};
use crate::context::{run_on_context, SchedulingContext};
use crate::model::error::{CapabilityError, CapabilityResult, ErrorCode};
use log::{error, info, warn};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Activation sub-step, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStep {
    LoadResources,
    Attach,
    ActivateComponents,
    InvokeStartup,
}

impl ActivationStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadResources => "load_resources",
            Self::Attach => "attach",
            Self::ActivateComponents => "activate_components",
            Self::InvokeStartup => "invoke_startup",
        }
    }
}

impl Display for ActivationStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one activation needs.
#[derive(Debug)]
pub struct ActivationJob {
    pub module_name: String,
    pub artifact_path: PathBuf,
    pub loader: SharedCodeLoader,
    pub instance: RuntimeInstance,
}

/// Runs activation sub-steps against the loader and activator capabilities.
#[derive(Clone)]
pub struct ActivationCoordinator {
    loader: Arc<dyn ModuleLoader>,
    activator: Arc<dyn Activator>,
}

impl ActivationCoordinator {
    pub fn new(loader: Arc<dyn ModuleLoader>, activator: Arc<dyn Activator>) -> Self {
        Self { loader, activator }
    }

    /// Activates on `context`, blocking until the context reports back.
    ///
    /// A rendezvous failure is reported as `ErrorCode::Interrupted`.
    pub fn activate_on(
        &self,
        context: &dyn SchedulingContext,
        job: ActivationJob,
    ) -> CapabilityResult<()> {
        let coordinator = self.clone();
        match run_on_context(context, move || coordinator.activate(&job)) {
            Ok(result) => result,
            Err(err) => Err(CapabilityError::new(ErrorCode::Interrupted, err)),
        }
    }

    /// Runs all sub-steps inline. Callers must already be on the
    /// designated context.
    pub fn activate(&self, job: &ActivationJob) -> CapabilityResult<()> {
        let started_at = Instant::now();
        let name = job.module_name.as_str();

        if let Err(err) = self.loader.load_resources(&job.artifact_path) {
            warn!(
                "event=module_activate module=activation status=degraded name={} step={} artifact={} error_code={} error={}",
                name,
                ActivationStep::LoadResources,
                job.artifact_path.display(),
                err.code().as_str(),
                err
            );
        }

        self.run_step(name, ActivationStep::Attach, || {
            self.activator.attach(&job.instance)
        })?;
        self.run_step(name, ActivationStep::ActivateComponents, || {
            self.activator.activate_components(&job.loader, name)
        })?;
        self.run_step(name, ActivationStep::InvokeStartup, || {
            self.activator.invoke_startup(&job.instance)
        })?;

        info!(
            "event=module_activate module=activation status=ok name={} duration_ms={}",
            name,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn run_step(
        &self,
        name: &str,
        step: ActivationStep,
        action: impl FnOnce() -> CapabilityResult<()>,
    ) -> CapabilityResult<()> {
        action().map_err(|err| {
            error!(
                "event=module_activate module=activation status=error name={} step={} error_code={} error={}",
                name,
                step,
                err.code().as_str(),
                err
            );
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ActivationCoordinator, ActivationJob};
    use crate::capability::{
        Activator, CodeUnitLoader, ModuleLoader, RuntimeInstance, SharedCodeLoader,
    };
    use crate::context::{InlineContext, MainQueue};
    use crate::model::error::{CapabilityError, CapabilityResult, ErrorCode};
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug)]
    struct StubCode(String);

    impl CodeUnitLoader for StubCode {
        fn module_name(&self) -> &str {
            &self.0
        }
    }

    #[derive(Default)]
    struct Journal {
        steps: Mutex<Vec<String>>,
        fail_resources: bool,
        fail_at: Option<&'static str>,
    }

    impl Journal {
        fn record(&self, step: &'static str, code: ErrorCode) -> CapabilityResult<()> {
            self.steps.lock().push(step.to_string());
            if self.fail_at == Some(step) {
                return Err(CapabilityError::new(code, format!("{step} failed")));
            }
            Ok(())
        }
    }

    impl ModuleLoader for Journal {
        fn load_code(
            &self,
            name: &str,
            _extra_code_paths: &[PathBuf],
            _optimized_dir: Option<&Path>,
            _native_lib_dir: Option<&Path>,
            _dependencies: &[String],
        ) -> CapabilityResult<SharedCodeLoader> {
            Ok(Arc::new(StubCode(name.to_string())))
        }

        fn unload_code(&self, _loader: &SharedCodeLoader) {}

        fn load_resources(&self, _artifact_path: &Path) -> CapabilityResult<()> {
            self.steps.lock().push("resources".to_string());
            if self.fail_resources {
                return Err(CapabilityError::new(ErrorCode::LoadResources, "no resources"));
            }
            Ok(())
        }
    }

    impl Activator for Journal {
        fn create_runtime_instance(
            &self,
            _loader: &SharedCodeLoader,
            name: &str,
        ) -> CapabilityResult<RuntimeInstance> {
            Ok(RuntimeInstance::new(name, ()))
        }

        fn attach(&self, _instance: &RuntimeInstance) -> CapabilityResult<()> {
            self.record("attach", ErrorCode::AttachInstance)
        }

        fn activate_components(&self, _loader: &SharedCodeLoader, _name: &str) -> CapabilityResult<()> {
            self.record("components", ErrorCode::ActivateComponents)
        }

        fn invoke_startup(&self, _instance: &RuntimeInstance) -> CapabilityResult<()> {
            self.record("startup", ErrorCode::InvokeStartup)
        }
    }

    fn coordinator(journal: &Arc<Journal>) -> ActivationCoordinator {
        ActivationCoordinator::new(journal.clone(), journal.clone())
    }

    fn job(name: &str) -> ActivationJob {
        ActivationJob {
            module_name: name.to_string(),
            artifact_path: PathBuf::from(format!("/modules/{name}.apk")),
            loader: Arc::new(StubCode(name.to_string())),
            instance: RuntimeInstance::new(name, ()),
        }
    }

    #[test]
    fn runs_steps_in_order() {
        let journal = Arc::new(Journal::default());
        coordinator(&journal)
            .activate(&job("feature.a"))
            .expect("activation should succeed");
        assert_eq!(
            *journal.steps.lock(),
            vec!["resources", "attach", "components", "startup"]
        );
    }

    #[test]
    fn resource_failure_is_not_fatal() {
        let journal = Arc::new(Journal {
            fail_resources: true,
            ..Journal::default()
        });
        coordinator(&journal)
            .activate_on(&InlineContext, job("feature.a"))
            .expect("resource failure should be tolerated");
        assert_eq!(journal.steps.lock().len(), 4);
    }

    #[test]
    fn stops_at_first_fatal_step() {
        let journal = Arc::new(Journal {
            fail_at: Some("components"),
            ..Journal::default()
        });
        let err = coordinator(&journal)
            .activate(&job("feature.a"))
            .expect_err("components failure is fatal");
        assert_eq!(err.code(), ErrorCode::ActivateComponents);
        assert_eq!(
            *journal.steps.lock(),
            vec!["resources", "attach", "components"]
        );
    }

    #[test]
    fn closed_context_reports_interrupted() {
        let journal = Arc::new(Journal::default());
        let (queue, main_loop) = MainQueue::bind();
        drop(main_loop);
        let activation = coordinator(&journal);
        let err = thread::spawn(move || activation.activate_on(&queue, job("feature.a")))
            .join()
            .expect("worker thread should not panic")
            .expect_err("closed context must fail");
        assert_eq!(err.code(), ErrorCode::Interrupted);
        assert!(journal.steps.lock().is_empty());
    }
}
