//! Module descriptor, load request and result records.
//!
//! # Responsibility
//! - Carry descriptor metadata resolved by the info provider.
//! - Validate load requests against the descriptor they target.
//! - Provide immutable brief-info records for install/load reporting.
//!
//! # Invariants
//! - `optimized_dir` is required iff the descriptor carries code.
//! - `native_lib_dir` is required iff the descriptor carries a primary
//!   native library.
//! - A module name maps to at most one `LoadedModuleRecord` per registry.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Immutable metadata for one installable module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Unique module key, e.g. `feature.camera`.
    pub name: String,
    pub version: String,
    /// Shipped inside the host package rather than downloaded.
    #[serde(default)]
    pub built_in: bool,
    /// Names of modules whose loaders must already be resolvable.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Whether the module carries compiled code.
    #[serde(default)]
    pub has_code: bool,
    /// Primary native-library resource, if the module carries one.
    #[serde(default)]
    pub primary_native_lib: Option<String>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            built_in: false,
            dependencies: Vec::new(),
            has_code: false,
            primary_native_lib: None,
        }
    }

    pub fn carries_native_lib(&self) -> bool {
        self.primary_native_lib.is_some()
    }
}

/// One request to load an installed module into the running process.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadRequest {
    pub module_name: String,
    /// Installed code artifact; required for every request.
    #[serde(default)]
    pub artifact_path: Option<PathBuf>,
    #[serde(default)]
    pub extra_code_paths: Vec<PathBuf>,
    #[serde(default)]
    pub optimized_dir: Option<PathBuf>,
    #[serde(default)]
    pub native_lib_dir: Option<PathBuf>,
}

impl LoadRequest {
    pub fn new(module_name: impl Into<String>, artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            module_name: module_name.into(),
            artifact_path: Some(artifact_path.into()),
            ..Self::default()
        }
    }

    pub fn with_optimized_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.optimized_dir = Some(dir.into());
        self
    }

    pub fn with_native_lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.native_lib_dir = Some(dir.into());
        self
    }

    pub fn with_extra_code_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_code_paths.push(path.into());
        self
    }

    /// Checks conditionally required fields against the target descriptor.
    ///
    /// Returns the artifact path on success so callers never re-check it.
    pub fn validate_against(
        &self,
        descriptor: &ModuleDescriptor,
    ) -> Result<&Path, RequestValidationError> {
        let artifact = match self.artifact_path.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => {
                return Err(RequestValidationError::MissingArtifactPath(
                    self.module_name.clone(),
                ))
            }
        };
        if descriptor.has_code && self.optimized_dir.is_none() {
            return Err(RequestValidationError::MissingOptimizedDir(
                self.module_name.clone(),
            ));
        }
        if descriptor.carries_native_lib() && self.native_lib_dir.is_none() {
            return Err(RequestValidationError::MissingNativeLibDir(
                self.module_name.clone(),
            ));
        }
        Ok(artifact)
    }
}

/// Required-field violations for one load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestValidationError {
    MissingArtifactPath(String),
    MissingOptimizedDir(String),
    MissingNativeLibDir(String),
}

impl Display for RequestValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingArtifactPath(name) => {
                write!(f, "artifact path of module {name} is missing")
            }
            Self::MissingOptimizedDir(name) => {
                write!(f, "optimized dir of module {name} is missing")
            }
            Self::MissingNativeLibDir(name) => {
                write!(f, "native-lib dir of module {name} is missing")
            }
        }
    }
}

impl Error for RequestValidationError {}

/// Whether an install attempt placed a new payload or found one in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallFlag {
    FirstInstalled,
    AlreadyInstalled,
}

/// Per-attempt summary handed to reporters.
///
/// Built with consuming setters and never mutated once pushed into an
/// outcome list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleBriefInfo {
    name: String,
    version: String,
    built_in: bool,
    flag: Option<InstallFlag>,
    elapsed: Duration,
}

impl ModuleBriefInfo {
    pub fn from_descriptor(descriptor: &ModuleDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            built_in: descriptor.built_in,
            flag: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_flag(mut self, flag: InstallFlag) -> Self {
        self.flag = Some(flag);
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn built_in(&self) -> bool {
        self.built_in
    }

    /// Install flag; `None` for load results.
    pub fn flag(&self) -> Option<InstallFlag> {
        self.flag
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Ledger entry for a module loaded into this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModuleRecord {
    pub name: String,
    pub artifact_path: PathBuf,
}

/// Result returned by the installer for one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResult {
    pub module_name: String,
    pub first_installed: bool,
    pub artifact_path: PathBuf,
    #[serde(default)]
    pub extra_code_paths: Vec<PathBuf>,
    #[serde(default)]
    pub optimized_dir: Option<PathBuf>,
    #[serde(default)]
    pub native_lib_dir: Option<PathBuf>,
}

impl InstallResult {
    pub fn flag(&self) -> InstallFlag {
        if self.first_installed {
            InstallFlag::FirstInstalled
        } else {
            InstallFlag::AlreadyInstalled
        }
    }

    /// Builds the load request that activates this installed payload.
    pub fn to_load_request(&self) -> LoadRequest {
        LoadRequest {
            module_name: self.module_name.clone(),
            artifact_path: Some(self.artifact_path.clone()),
            extra_code_paths: self.extra_code_paths.clone(),
            optimized_dir: self.optimized_dir.clone(),
            native_lib_dir: self.native_lib_dir.clone(),
        }
    }
}
