//! Load batch orchestration.
//!
//! # Responsibility
//! - Resolve, validate, load and activate each requested module in order.
//! - Keep the registry consistent: one record and one cached loader per name.
//! - Aggregate per-module results into one outcome per batch.
//!
//! # Invariants
//! - At most one batch per runtime is in flight; callers serialize.
//! - A per-module failure never aborts the batch.
//! - Unresolved names and already-loaded names are skipped without errors.
//! - A loader created by a failed attempt is released; a cached one is not.
//! - Registry reads stay available while a batch activates its modules.

use crate::activation::{ActivationCoordinator, ActivationJob};
use crate::capability::{
    Activator, LoadFinishListener, ModuleInfoProvider, ModuleLoader, SharedCodeLoader,
};
use crate::config::PipelineConfig;
use crate::context::SchedulingContext;
use crate::model::error::{ErrorCode, ModuleError};
use crate::model::module::{LoadRequest, LoadedModuleRecord, ModuleBriefInfo, ModuleDescriptor};
use crate::runtime::ModuleRuntime;
use crossbeam::channel::{self, Sender};
use log::{error, info, warn};
use once_cell::sync::OnceCell;
use std::fs::File;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

const LOAD_WORKER_THREAD_NAME: &str = "module-load-worker";

type WorkerJob = Box<dyn FnOnce() + Send + 'static>;

static LOAD_WORKER: OnceCell<Sender<WorkerJob>> = OnceCell::new();

/// Aggregated result of one load batch.
#[derive(Debug)]
pub struct LoadOutcome {
    pub batch_id: Uuid,
    /// Modules loaded and activated by this batch, in request order.
    pub loaded: Vec<ModuleBriefInfo>,
    /// Modules that failed in this batch, in request order.
    pub errors: Vec<ModuleError>,
    pub process_name: String,
    pub elapsed: Duration,
}

impl LoadOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn loaded_names(&self) -> Vec<&str> {
        self.loaded.iter().map(|info| info.name()).collect()
    }

    pub fn error_names(&self) -> Vec<&str> {
        self.errors.iter().map(|err| err.module_name()).collect()
    }
}

/// Capabilities a load pipeline calls into.
#[derive(Clone)]
pub struct LoadCapabilities {
    pub info: Arc<dyn ModuleInfoProvider>,
    pub loader: Arc<dyn ModuleLoader>,
    pub activator: Arc<dyn Activator>,
}

/// Per-batch load orchestrator bound to one runtime and one designated
/// context.
#[derive(Clone)]
pub struct LoadPipeline {
    runtime: ModuleRuntime,
    info: Arc<dyn ModuleInfoProvider>,
    loader: Arc<dyn ModuleLoader>,
    activator: Arc<dyn Activator>,
    activation: ActivationCoordinator,
    context: Arc<dyn SchedulingContext>,
    config: PipelineConfig,
}

/// Successful single-module attempt, staged until the batch publishes.
struct LoadedModule {
    info: ModuleBriefInfo,
    record: LoadedModuleRecord,
    fresh_loader: Option<SharedCodeLoader>,
}

impl LoadPipeline {
    pub fn new(
        runtime: ModuleRuntime,
        capabilities: LoadCapabilities,
        context: Arc<dyn SchedulingContext>,
        config: PipelineConfig,
    ) -> Self {
        let activation = ActivationCoordinator::new(
            capabilities.loader.clone(),
            capabilities.activator.clone(),
        );
        Self {
            runtime,
            info: capabilities.info,
            loader: capabilities.loader,
            activator: capabilities.activator,
            activation,
            context,
            config,
        }
    }

    pub fn runtime(&self) -> &ModuleRuntime {
        &self.runtime
    }

    /// Runs one batch on the calling thread and returns its outcome.
    ///
    /// The listener, if any, is invoked after the batch lock is released.
    ///
    /// # Deadlock
    /// Calling this from the designated context while another batch of the
    /// same runtime waits on that context blocks both forever.
    pub fn load_sync(
        &self,
        requests: Vec<LoadRequest>,
        listener: Option<Arc<dyn LoadFinishListener>>,
    ) -> LoadOutcome {
        let outcome = self.run_batch(&requests);
        if let Some(listener) = listener {
            listener.on_load_finish(&outcome);
        }
        outcome
    }

    /// Queues one batch on the process-wide load worker and returns.
    ///
    /// Falls back to running inline when the worker cannot be started.
    pub fn load_async(
        &self,
        requests: Vec<LoadRequest>,
        listener: Option<Arc<dyn LoadFinishListener>>,
    ) {
        let pipeline = self.clone();
        let job: WorkerJob = Box::new(move || {
            pipeline.load_sync(requests, listener);
        });

        let job = match load_worker() {
            Some(sender) => match sender.send(job) {
                Ok(()) => return,
                Err(err) => err.into_inner(),
            },
            None => job,
        };
        error!("event=load_worker module=pipeline status=error error_code=worker_unavailable fallback=inline");
        job();
    }

    fn run_batch(&self, requests: &[LoadRequest]) -> LoadOutcome {
        let batch = self.runtime.begin_batch();
        let batch_id = Uuid::new_v4();
        let started_at = Instant::now();
        info!(
            "event=load_batch module=pipeline status=start batch_id={} requests={} process={}",
            batch_id,
            requests.len(),
            self.config.process_name
        );

        let mut loaded = Vec::with_capacity(requests.len());
        let mut errors = Vec::new();
        let mut records: Vec<LoadedModuleRecord> = Vec::new();
        let mut fresh_loaders: Vec<SharedCodeLoader> = Vec::new();

        for request in requests {
            match self.load_one(&records, request) {
                Ok(Some(module)) => {
                    loaded.push(module.info);
                    records.push(module.record);
                    if let Some(loader) = module.fresh_loader {
                        fresh_loaders.push(loader);
                    }
                }
                Ok(None) => {}
                Err(err) => errors.push(err),
            }
        }

        for discarded in self.runtime.publish(records, fresh_loaders) {
            warn!(
                "event=loader_merge module=pipeline status=discarded batch_id={} name={}",
                batch_id,
                discarded.module_name()
            );
            self.loader.unload_code(&discarded);
        }
        drop(batch);

        let outcome = LoadOutcome {
            batch_id,
            loaded,
            errors,
            process_name: self.config.process_name.clone(),
            elapsed: started_at.elapsed(),
        };
        info!(
            "event=load_batch module=pipeline status={} batch_id={} loaded={} failed={} duration_ms={}",
            if outcome.is_success() { "ok" } else { "partial" },
            batch_id,
            outcome.loaded.len(),
            outcome.errors.len(),
            outcome.elapsed.as_millis()
        );
        outcome
    }

    /// Loads one module. `Ok(None)` means the request was skipped.
    fn load_one(
        &self,
        staged: &[LoadedModuleRecord],
        request: &LoadRequest,
    ) -> Result<Option<LoadedModule>, ModuleError> {
        let started_at = Instant::now();
        let name = request.module_name.as_str();

        let Some(descriptor) = self.info.resolve(name) else {
            warn!(
                "event=module_load module=pipeline status=skip reason=unresolved name={}",
                name
            );
            return Ok(None);
        };
        if self.runtime.is_loaded(name) || staged.iter().any(|record| record.name == name) {
            info!(
                "event=module_load module=pipeline status=skip reason=already_loaded name={}",
                name
            );
            return Ok(None);
        }

        let brief = ModuleBriefInfo::from_descriptor(&descriptor);
        let artifact_path = match request.validate_against(&descriptor) {
            Ok(path) => path,
            Err(err) => {
                warn!(
                    "event=module_load module=pipeline status=error name={} error_code={} error={}",
                    name,
                    ErrorCode::Internal.as_str(),
                    err
                );
                return Err(ModuleError::new(brief, ErrorCode::Internal, err));
            }
        };

        let (loader, fresh) = match self.runtime.cached_loader(name) {
            Some(cached) => (cached, false),
            None => {
                let created = self
                    .loader
                    .load_code(
                        name,
                        &request.extra_code_paths,
                        request.optimized_dir.as_deref(),
                        request.native_lib_dir.as_deref(),
                        &descriptor.dependencies,
                    )
                    .map_err(|err| {
                        error!(
                            "event=module_load module=pipeline status=error name={} step=load_code error_code={} error={}",
                            name,
                            err.code().as_str(),
                            err
                        );
                        ModuleError::from_capability(brief.clone(), err)
                    })?;
                (created, true)
            }
        };

        let activated = self
            .activator
            .create_runtime_instance(&loader, name)
            .and_then(|instance| {
                self.activation.activate_on(
                    self.context.as_ref(),
                    ActivationJob {
                        module_name: name.to_string(),
                        artifact_path: artifact_path.to_path_buf(),
                        loader: loader.clone(),
                        instance,
                    },
                )
            });
        if let Err(err) = activated {
            error!(
                "event=module_load module=pipeline status=error name={} error_code={} fresh_loader={} error={}",
                name,
                err.code().as_str(),
                fresh,
                err
            );
            if fresh {
                self.loader.unload_code(&loader);
            }
            return Err(ModuleError::from_capability(brief, err));
        }

        self.refresh_freshness_marker(&descriptor);
        let elapsed = started_at.elapsed();
        info!(
            "event=module_load module=pipeline status=ok name={} version={} cached_loader={} duration_ms={}",
            name,
            descriptor.version,
            !fresh,
            elapsed.as_millis()
        );
        Ok(Some(LoadedModule {
            info: brief.with_elapsed(elapsed),
            record: LoadedModuleRecord {
                name: name.to_string(),
                artifact_path: artifact_path.to_path_buf(),
            },
            fresh_loader: fresh.then_some(loader),
        }))
    }

    fn refresh_freshness_marker(&self, descriptor: &ModuleDescriptor) {
        if !self.config.refresh_freshness_marker {
            return;
        }
        let Some(dir) = self.info.module_dir(descriptor) else {
            return;
        };
        let touched = File::open(&dir).and_then(|handle| handle.set_modified(SystemTime::now()));
        if let Err(err) = touched {
            warn!(
                "event=freshness_marker module=pipeline status=error name={} path={} error={}",
                descriptor.name,
                dir.display(),
                err
            );
        }
    }
}

/// Returns the process-wide load worker, starting it on first use.
fn load_worker() -> Option<&'static Sender<WorkerJob>> {
    LOAD_WORKER
        .get_or_try_init(|| -> std::io::Result<Sender<WorkerJob>> {
            let (sender, receiver) = channel::unbounded::<WorkerJob>();
            thread::Builder::new()
                .name(LOAD_WORKER_THREAD_NAME.to_string())
                .spawn(move || {
                    for job in receiver {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("event=load_worker module=pipeline status=error error_code=batch_panicked");
                        }
                    }
                })?;
            info!(
                "event=load_worker module=pipeline status=ok thread={}",
                LOAD_WORKER_THREAD_NAME
            );
            Ok(sender)
        })
        .map_err(|err| {
            error!("event=load_worker module=pipeline status=error error_code=spawn_failed error={err}");
            err
        })
        .ok()
}
