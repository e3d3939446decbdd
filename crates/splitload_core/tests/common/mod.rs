#![allow(dead_code)]

use parking_lot::Mutex;
use splitload_core::{
    Activator, CapabilityError, CapabilityResult, CodeUnitLoader, ErrorCode, InlineContext,
    LoadCapabilities, LoadFinishListener, LoadOutcome, LoadPipeline, LoadRequest,
    ModuleDescriptor, ModuleInfoProvider, ModuleLoader, ModuleRuntime, PipelineConfig,
    RuntimeInstance, SchedulingContext, SharedCodeLoader,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Step at which the mock host fails a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    LoadCode,
    CreateInstance,
    Resources,
    Attach,
    Components,
    Startup,
}

#[derive(Debug)]
pub struct MockCode {
    pub name: String,
    pub serial: usize,
}

impl CodeUnitLoader for MockCode {
    fn module_name(&self) -> &str {
        &self.name
    }
}

/// In-memory host implementing info, loader and activator capabilities.
#[derive(Default)]
pub struct MockHost {
    descriptors: Mutex<BTreeMap<String, ModuleDescriptor>>,
    module_dirs: Mutex<BTreeMap<String, PathBuf>>,
    failures: Mutex<BTreeMap<String, FailPoint>>,
    pub events: Mutex<Vec<String>>,
    pub attach_threads: Mutex<Vec<ThreadId>>,
    serial: AtomicUsize,
    step_delay: Mutex<Option<Duration>>,
    startup_query: Mutex<Option<(ModuleRuntime, String)>>,
    pub startup_answers: Mutex<Vec<(String, bool)>>,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_module(self: &Arc<Self>, descriptor: ModuleDescriptor) -> Arc<Self> {
        self.descriptors
            .lock()
            .insert(descriptor.name.clone(), descriptor);
        self.clone()
    }

    pub fn add_resource_module(self: &Arc<Self>, name: &str) -> Arc<Self> {
        self.with_module(ModuleDescriptor::new(name, "1.0.0"))
    }

    pub fn add_code_module(self: &Arc<Self>, name: &str) -> Arc<Self> {
        let mut descriptor = ModuleDescriptor::new(name, "1.0.0");
        descriptor.has_code = true;
        self.with_module(descriptor)
    }

    pub fn set_module_dir(&self, name: &str, dir: &Path) {
        self.module_dirs
            .lock()
            .insert(name.to_string(), dir.to_path_buf());
    }

    pub fn fail(&self, name: &str, point: FailPoint) {
        self.failures.lock().insert(name.to_string(), point);
    }

    pub fn clear_failure(&self, name: &str) {
        self.failures.lock().remove(name);
    }

    pub fn set_step_delay(&self, delay: Duration) {
        *self.step_delay.lock() = Some(delay);
    }

    /// Makes every startup ask `runtime` whether `name` is loaded.
    pub fn query_on_startup(&self, runtime: &ModuleRuntime, name: &str) {
        *self.startup_query.lock() = Some((runtime.clone(), name.to_string()));
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.starts_with(prefix))
            .count()
    }

    fn step(&self, step: &str, name: &str, point: FailPoint, code: ErrorCode) -> CapabilityResult<()> {
        if let Some(delay) = *self.step_delay.lock() {
            thread::sleep(delay);
        }
        self.events.lock().push(format!("{step}:{name}"));
        if self.failures.lock().get(name) == Some(&point) {
            return Err(CapabilityError::new(code, format!("{step} failed for {name}")));
        }
        Ok(())
    }
}

impl ModuleInfoProvider for MockHost {
    fn resolve(&self, name: &str) -> Option<ModuleDescriptor> {
        self.descriptors.lock().get(name).cloned()
    }

    fn module_dir(&self, descriptor: &ModuleDescriptor) -> Option<PathBuf> {
        self.module_dirs.lock().get(&descriptor.name).cloned()
    }
}

impl ModuleLoader for MockHost {
    fn load_code(
        &self,
        name: &str,
        _extra_code_paths: &[PathBuf],
        _optimized_dir: Option<&Path>,
        _native_lib_dir: Option<&Path>,
        _dependencies: &[String],
    ) -> CapabilityResult<SharedCodeLoader> {
        self.step("load_code", name, FailPoint::LoadCode, ErrorCode::LoadCode)?;
        Ok(Arc::new(MockCode {
            name: name.to_string(),
            serial: self.serial.fetch_add(1, Ordering::SeqCst),
        }))
    }

    fn unload_code(&self, loader: &SharedCodeLoader) {
        self.events
            .lock()
            .push(format!("unload:{}", loader.module_name()));
    }

    fn load_resources(&self, artifact_path: &Path) -> CapabilityResult<()> {
        let name = artifact_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.step("resources", &name, FailPoint::Resources, ErrorCode::LoadResources)
    }
}

impl Activator for MockHost {
    fn create_runtime_instance(
        &self,
        _loader: &SharedCodeLoader,
        name: &str,
    ) -> CapabilityResult<RuntimeInstance> {
        self.step("create", name, FailPoint::CreateInstance, ErrorCode::CreateInstance)?;
        Ok(RuntimeInstance::new(name, name.len()))
    }

    fn attach(&self, instance: &RuntimeInstance) -> CapabilityResult<()> {
        self.attach_threads.lock().push(thread::current().id());
        self.step("attach", instance.module_name(), FailPoint::Attach, ErrorCode::AttachInstance)
    }

    fn activate_components(&self, _loader: &SharedCodeLoader, name: &str) -> CapabilityResult<()> {
        self.step("components", name, FailPoint::Components, ErrorCode::ActivateComponents)
    }

    fn invoke_startup(&self, instance: &RuntimeInstance) -> CapabilityResult<()> {
        let query = self.startup_query.lock().clone();
        if let Some((runtime, name)) = query {
            let answer = runtime.is_loaded(&name);
            self.startup_answers
                .lock()
                .push((instance.module_name().to_string(), answer));
        }
        self.step("startup", instance.module_name(), FailPoint::Startup, ErrorCode::InvokeStartup)
    }
}

pub fn capabilities(host: &Arc<MockHost>) -> LoadCapabilities {
    LoadCapabilities {
        info: host.clone(),
        loader: host.clone(),
        activator: host.clone(),
    }
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        process_name: "host-test".to_string(),
        ..PipelineConfig::default()
    }
}

/// Pipeline over a fresh runtime that activates inline.
pub fn inline_pipeline(host: &Arc<MockHost>) -> LoadPipeline {
    pipeline_on(host, ModuleRuntime::new(), Arc::new(InlineContext))
}

pub fn pipeline_on(
    host: &Arc<MockHost>,
    runtime: ModuleRuntime,
    context: Arc<dyn SchedulingContext>,
) -> LoadPipeline {
    LoadPipeline::new(runtime, capabilities(host), context, test_config())
}

/// Resource-only request: artifact path `/modules/<name>.apk`.
pub fn request(name: &str) -> LoadRequest {
    LoadRequest::new(name, format!("/modules/{name}.apk"))
}

/// Request satisfying a code module's optimized-dir requirement.
pub fn code_request(name: &str) -> LoadRequest {
    request(name).with_optimized_dir(format!("/modules/opt/{name}"))
}

/// Listener forwarding a summary of each outcome over a channel.
pub struct ChannelListener {
    sender: crossbeam::channel::Sender<OutcomeSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeSummary {
    pub loaded: Vec<String>,
    pub errors: Vec<(String, ErrorCode)>,
    pub process_name: String,
}

impl ChannelListener {
    pub fn new() -> (Arc<Self>, crossbeam::channel::Receiver<OutcomeSummary>) {
        let (sender, receiver) = crossbeam::channel::unbounded();
        (Arc::new(Self { sender }), receiver)
    }
}

impl LoadFinishListener for ChannelListener {
    fn on_load_finish(&self, outcome: &LoadOutcome) {
        let _ = self.sender.send(OutcomeSummary {
            loaded: outcome.loaded_names().iter().map(|name| name.to_string()).collect(),
            errors: outcome
                .errors
                .iter()
                .map(|err| (err.module_name().to_string(), err.code()))
                .collect(),
            process_name: outcome.process_name.clone(),
        });
    }
}
