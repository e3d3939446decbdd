//! Error codes and per-module error records.
//!
//! # Responsibility
//! - Define stable error codes shared by install, load and activation.
//! - Wrap capability failures with the module they belong to.
//!
//! # Invariants
//! - Per-module failures are captured as `ModuleError` and never escape a
//!   batch.

use crate::model::module::ModuleBriefInfo;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Boxed underlying cause carried by capability and module errors.
pub type BoxedCause = Box<dyn Error + Send + Sync + 'static>;

/// Stable error code attached to every module failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A required request field is missing or invalid.
    Internal,
    /// The rendezvous with the designated context was interrupted.
    Interrupted,
    LoadCode,
    CreateInstance,
    LoadResources,
    AttachInstance,
    ActivateComponents,
    InvokeStartup,
    /// Installer-specific code, passed through unchanged.
    Install(i32),
}

impl ErrorCode {
    /// Numeric code used by reporters.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Internal => -1,
            Self::Interrupted => -2,
            Self::LoadCode => -21,
            Self::CreateInstance => -22,
            Self::LoadResources => -23,
            Self::AttachInstance => -24,
            Self::ActivateComponents => -25,
            Self::InvokeStartup => -26,
            Self::Install(code) => code,
        }
    }

    /// Stable string id used in log events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal_error",
            Self::Interrupted => "interrupted_error",
            Self::LoadCode => "load_code_failed",
            Self::CreateInstance => "create_instance_failed",
            Self::LoadResources => "load_resources_failed",
            Self::AttachInstance => "attach_instance_failed",
            Self::ActivateComponents => "activate_components_failed",
            Self::InvokeStartup => "invoke_startup_failed",
            Self::Install(_) => "install_failed",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.as_str(), self.as_i32())
    }
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Failure returned by an external capability.
#[derive(Debug)]
pub struct CapabilityError {
    code: ErrorCode,
    cause: BoxedCause,
}

impl CapabilityError {
    pub fn new(code: ErrorCode, cause: impl Into<BoxedCause>) -> Self {
        Self {
            code,
            cause: cause.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn cause(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.cause.as_ref()
    }

    pub fn into_parts(self) -> (ErrorCode, BoxedCause) {
        (self.code, self.cause)
    }
}

impl Display for CapabilityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.cause)
    }
}

impl Error for CapabilityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// One failed module in one batch.
#[derive(Debug)]
pub struct ModuleError {
    info: ModuleBriefInfo,
    code: ErrorCode,
    cause: BoxedCause,
}

impl ModuleError {
    pub fn new(info: ModuleBriefInfo, code: ErrorCode, cause: impl Into<BoxedCause>) -> Self {
        Self {
            info,
            code,
            cause: cause.into(),
        }
    }

    pub fn from_capability(info: ModuleBriefInfo, err: CapabilityError) -> Self {
        let (code, cause) = err.into_parts();
        Self { info, code, cause }
    }

    pub fn info(&self) -> &ModuleBriefInfo {
        &self.info
    }

    pub fn module_name(&self) -> &str {
        self.info.name()
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn cause(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.cause.as_ref()
    }
}

impl Display for ModuleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "module {}@{} failed with {}: {}",
            self.info.name(),
            self.info.version(),
            self.code,
            self.cause
        )
    }
}

impl Error for ModuleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause.as_ref())
    }
}
