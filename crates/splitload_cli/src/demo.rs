//! File-backed demo capabilities.
//!
//! Installing writes a placeholder artifact under the work directory.
//! Loading and activation only record what happened in the log.

use log::{info, warn};
use parking_lot::Mutex;
use splitload_core::{
    Activator, CapabilityError, CapabilityResult, CodeUnitLoader, ErrorCode, InstallReporter,
    InstallResult, Installer, ModuleBriefInfo, ModuleDescriptor, ModuleError, ModuleInfoProvider,
    ModuleLoader, RuntimeInstance, SharedCodeLoader,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const ARTIFACT_EXTENSION: &str = "module";
/// Installer codes stay clear of the pipeline's reserved range.
const INSTALL_REFUSED: i32 = -100;
const INSTALL_WRITE_FAILED: i32 = -101;

#[derive(Debug)]
struct DemoCode {
    name: String,
}

impl CodeUnitLoader for DemoCode {
    fn module_name(&self) -> &str {
        &self.name
    }
}

/// Startup state handed to the host for one demo module.
#[derive(Debug)]
pub struct DemoInstance {
    pub started: bool,
}

pub struct DemoHost {
    work_dir: PathBuf,
    descriptors: Vec<ModuleDescriptor>,
    failing_installs: Mutex<BTreeSet<String>>,
    failing_attaches: Mutex<BTreeSet<String>>,
}

impl DemoHost {
    pub fn new(work_dir: PathBuf, names: &[String]) -> Self {
        let descriptors = names
            .iter()
            .map(|name| ModuleDescriptor::new(name.as_str(), "1.0.0"))
            .collect();
        Self {
            work_dir,
            descriptors,
            failing_installs: Mutex::new(BTreeSet::new()),
            failing_attaches: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        self.descriptors.clone()
    }

    pub fn fail_install(&self, name: &str) {
        self.failing_installs.lock().insert(name.to_string());
    }

    pub fn fail_attach(&self, name: &str) {
        self.failing_attaches.lock().insert(name.to_string());
    }

    fn install_dir(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }
}

impl Installer for DemoHost {
    fn install(
        &self,
        is_start_mode: bool,
        descriptor: &ModuleDescriptor,
    ) -> CapabilityResult<InstallResult> {
        if self.failing_installs.lock().contains(&descriptor.name) {
            return Err(CapabilityError::new(
                ErrorCode::Install(INSTALL_REFUSED),
                format!("download of {} refused", descriptor.name),
            ));
        }

        let dir = self.install_dir(&descriptor.name);
        let artifact = dir.join(format!("{}.{ARTIFACT_EXTENSION}", descriptor.name));
        let first_installed = !artifact.exists();
        if first_installed {
            fs::create_dir_all(&dir)
                .and_then(|()| fs::write(&artifact, descriptor.version.as_bytes()))
                .map_err(|err| CapabilityError::new(ErrorCode::Install(INSTALL_WRITE_FAILED), err))?;
        }
        info!(
            "event=demo_install module=cli status=ok name={} start_mode={} first={}",
            descriptor.name, is_start_mode, first_installed
        );
        Ok(InstallResult {
            module_name: descriptor.name.clone(),
            first_installed,
            artifact_path: artifact,
            extra_code_paths: Vec::new(),
            optimized_dir: None,
            native_lib_dir: None,
        })
    }
}

impl InstallReporter for DemoHost {
    fn on_start_install_failed(
        &self,
        installed: &[ModuleBriefInfo],
        error: &ModuleError,
        elapsed: Duration,
    ) {
        warn!(
            "event=demo_report module=cli status=error installed={} failed={} duration_ms={}",
            installed.len(),
            error.module_name(),
            elapsed.as_millis()
        );
    }

    fn on_deferred_install_failed(
        &self,
        installed: &[ModuleBriefInfo],
        errors: &[ModuleError],
        elapsed: Duration,
    ) {
        warn!(
            "event=demo_report module=cli status=error installed={} failed={} duration_ms={}",
            installed.len(),
            errors.len(),
            elapsed.as_millis()
        );
    }
}

impl ModuleInfoProvider for DemoHost {
    fn resolve(&self, name: &str) -> Option<ModuleDescriptor> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.name == name)
            .cloned()
    }

    fn module_dir(&self, descriptor: &ModuleDescriptor) -> Option<PathBuf> {
        Some(self.install_dir(&descriptor.name))
    }
}

impl ModuleLoader for DemoHost {
    fn load_code(
        &self,
        name: &str,
        _extra_code_paths: &[PathBuf],
        _optimized_dir: Option<&Path>,
        _native_lib_dir: Option<&Path>,
        _dependencies: &[String],
    ) -> CapabilityResult<SharedCodeLoader> {
        Ok(Arc::new(DemoCode {
            name: name.to_string(),
        }))
    }

    fn unload_code(&self, loader: &SharedCodeLoader) {
        info!(
            "event=demo_unload module=cli status=ok name={}",
            loader.module_name()
        );
    }

    fn load_resources(&self, artifact_path: &Path) -> CapabilityResult<()> {
        if artifact_path.is_file() {
            Ok(())
        } else {
            Err(CapabilityError::new(
                ErrorCode::LoadResources,
                format!("artifact {} is missing", artifact_path.display()),
            ))
        }
    }
}

impl Activator for DemoHost {
    fn create_runtime_instance(
        &self,
        _loader: &SharedCodeLoader,
        name: &str,
    ) -> CapabilityResult<RuntimeInstance> {
        Ok(RuntimeInstance::new(name, DemoInstance { started: false }))
    }

    fn attach(&self, instance: &RuntimeInstance) -> CapabilityResult<()> {
        if self.failing_attaches.lock().contains(instance.module_name()) {
            return Err(CapabilityError::new(
                ErrorCode::AttachInstance,
                format!("host rejected {}", instance.module_name()),
            ));
        }
        Ok(())
    }

    fn activate_components(&self, _loader: &SharedCodeLoader, name: &str) -> CapabilityResult<()> {
        info!("event=demo_components module=cli status=ok name={name}");
        Ok(())
    }

    fn invoke_startup(&self, instance: &RuntimeInstance) -> CapabilityResult<()> {
        let fresh = instance
            .downcast_ref::<DemoInstance>()
            .is_some_and(|state| !state.started);
        info!(
            "event=demo_startup module=cli status=ok name={} fresh={}",
            instance.module_name(),
            fresh
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DemoHost;
    use splitload_core::{Installer, ModuleInfoProvider, ModuleLoader};

    #[test]
    fn install_writes_artifact_once() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let host = DemoHost::new(dir.path().to_path_buf(), &["demo.alpha".to_string()]);
        let descriptor = host.resolve("demo.alpha").expect("descriptor");

        let first = host.install(true, &descriptor).expect("first install");
        let second = host.install(true, &descriptor).expect("second install");

        assert!(first.first_installed);
        assert!(!second.first_installed);
        assert!(first.artifact_path.is_file());
        assert!(host.load_resources(&first.artifact_path).is_ok());
        assert_eq!(
            host.module_dir(&descriptor),
            Some(dir.path().join("demo.alpha"))
        );
    }

    #[test]
    fn refused_install_reports_error_code() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let host = DemoHost::new(dir.path().to_path_buf(), &["demo.beta".to_string()]);
        host.fail_install("demo.beta");
        let descriptor = host.resolve("demo.beta").expect("descriptor");

        let err = host.install(false, &descriptor).expect_err("install should fail");
        assert_eq!(err.code().as_i32(), super::INSTALL_REFUSED);
        assert_ne!(err.code().as_i32(), splitload_core::ErrorCode::Internal.as_i32());
    }
}
