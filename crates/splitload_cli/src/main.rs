//! Demo host driving one install batch and one load batch.
//!
//! # Responsibility
//! - Wire file-backed demo capabilities into the core pipeline.
//! - Bind the main thread as the designated context and pump it until the
//!   asynchronous load batch reports back.

mod demo;

use clap::Parser;
use demo::DemoHost;
use log::{error, info};
use splitload_core::{
    init_logging, InstallHooks, InstallMode, InstallOrchestrator, LoadCapabilities,
    LoadFinishListener, LoadOutcome, LoadPipeline, MainQueue, ModuleRuntime, PipelineConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "splitload",
    about = "Install and load demo feature modules into this process",
    version = splitload_core::core_version()
)]
struct Cli {
    /// Module names to install and load, in order
    #[arg(default_values_t = vec!["demo.alpha".to_string(), "demo.beta".to_string()])]
    modules: Vec<String>,

    /// Pipeline config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory receiving installed module artifacts
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Install in deferred (collect-all) mode instead of start mode
    #[arg(long)]
    deferred: bool,

    /// Module whose install fails, for exercising error reporting
    #[arg(long = "fail-install")]
    fail_install: Vec<String>,

    /// Module whose activation fails at the attach step
    #[arg(long = "fail-attach")]
    fail_attach: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = splitload_core::default_log_level())]
    log_level: String,

    /// Directory for rolling log files; logging stays off when omitted
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Print core linkage info and exit
    #[arg(long)]
    health: bool,
}

/// Printable view of a finished load batch.
struct LoadReport {
    summary: String,
    failures: Vec<String>,
    success: bool,
}

impl LoadReport {
    fn from_outcome(outcome: &LoadOutcome) -> Self {
        Self {
            summary: format!(
                "batch {} in {} ms: loaded [{}]",
                outcome.batch_id,
                outcome.elapsed.as_millis(),
                outcome.loaded_names().join(", ")
            ),
            failures: outcome
                .errors
                .iter()
                .map(|err| format!("load failed: {} ({}) {}", err.module_name(), err.code(), err))
                .collect(),
            success: outcome.is_success(),
        }
    }
}

struct ChannelListener {
    sender: crossbeam::channel::Sender<LoadReport>,
}

impl LoadFinishListener for ChannelListener {
    fn on_load_finish(&self, outcome: &LoadOutcome) {
        let _ = self.sender.send(LoadReport::from_outcome(outcome));
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.health {
        println!("splitload_core ping={}", splitload_core::ping());
        println!("splitload_core version={}", splitload_core::core_version());
        return ExitCode::SUCCESS;
    }

    if let Some(dir) = &cli.log_dir {
        if let Err(err) = init_logging(&cli.log_level, &dir.to_string_lossy()) {
            eprintln!("logging disabled: {err}");
        }
    }

    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("invalid config {}: {err}", path.display());
                return ExitCode::from(2);
            }
        },
        None => PipelineConfig::default(),
    };

    let work_dir = cli
        .work_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("splitload-demo"));
    let host = Arc::new(DemoHost::new(work_dir, &cli.modules));
    for name in &cli.fail_install {
        host.fail_install(name);
    }
    for name in &cli.fail_attach {
        host.fail_attach(name);
    }

    let mode = if cli.deferred {
        InstallMode::Deferred
    } else {
        InstallMode::Start
    };
    let installer = InstallOrchestrator::new(host.clone(), Some(host.clone()), config.install.clone());
    let installed = installer.run(mode, &host.descriptors(), InstallHooks::new());
    for err in &installed.errors {
        println!("install failed: {} ({}) {}", err.module_name(), err.code(), err);
    }
    if installed.results.is_empty() {
        println!("nothing to load");
        return ExitCode::FAILURE;
    }

    let (main_queue, main_loop) = MainQueue::bind();
    let pipeline = LoadPipeline::new(
        ModuleRuntime::global().clone(),
        LoadCapabilities {
            info: host.clone(),
            loader: host.clone(),
            activator: host.clone(),
        },
        Arc::new(main_queue),
        config,
    );

    let (sender, receiver) = crossbeam::channel::bounded(1);
    pipeline.load_async(
        installed.load_requests(),
        Some(Arc::new(ChannelListener { sender })),
    );
    main_loop.run_until(Duration::from_millis(10), || !receiver.is_empty());

    let report = match receiver.recv_timeout(Duration::from_secs(5)) {
        Ok(report) => report,
        Err(err) => {
            error!("event=cli_load module=cli status=error error={err}");
            eprintln!("load batch did not report back: {err}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "event=cli_load module=cli status=done success={} failed={}",
        report.success,
        report.failures.len()
    );
    println!("{}", report.summary);
    for line in &report.failures {
        println!("{line}");
    }

    if installed.is_success() && report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn parses_health_flag_and_default_modules() {
        let cli = Cli::try_parse_from(["splitload", "--health"]).expect("health flag parses");
        assert!(cli.health);
        assert_eq!(cli.modules, vec!["demo.alpha", "demo.beta"]);
        assert_eq!(splitload_core::ping(), "pong");
    }
}
