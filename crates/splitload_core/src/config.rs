//! Pipeline configuration.
//!
//! # Responsibility
//! - Hold tunables for load batches and install batches.
//! - Parse configuration from JSON with defaults for omitted keys.
//!
//! # Invariants
//! - Unknown keys are rejected instead of silently ignored.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

const FALLBACK_PROCESS_NAME: &str = "main";

/// Tunables for the load and install pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Process identifier reported with every load batch.
    pub process_name: String,
    /// Bump the module directory mtime after a successful load.
    pub refresh_freshness_marker: bool,
    pub install: InstallConfig,
}

/// Install batch tunables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallConfig {
    /// Serialize install batches behind a process-wide lock.
    pub serialize_batches: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            process_name: default_process_name(),
            refresh_freshness_marker: true,
            install: InstallConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.process_name.trim().is_empty() {
            return Err(ConfigError::Invalid("process_name must not be empty"));
        }
        Ok(())
    }
}

fn default_process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_PROCESS_NAME.to_string())
}

/// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, PipelineConfig};

    #[test]
    fn empty_object_yields_defaults() {
        let config = PipelineConfig::from_json_str("{}").expect("empty config should parse");
        assert_eq!(config, PipelineConfig::default());
        assert!(config.refresh_freshness_marker);
        assert!(!config.install.serialize_batches);
        assert!(!config.process_name.is_empty());
    }

    #[test]
    fn overrides_selected_keys() {
        let config = PipelineConfig::from_json_str(
            r#"{"process_name":"host:feature","install":{"serialize_batches":true}}"#,
        )
        .expect("config should parse");
        assert_eq!(config.process_name, "host:feature");
        assert!(config.install.serialize_batches);
        assert!(config.refresh_freshness_marker);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = PipelineConfig::from_json_str(r#"{"timeout_ms":5}"#)
            .expect_err("unknown keys must be rejected");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_blank_process_name() {
        let err = PipelineConfig::from_json_str(r#"{"process_name":"  "}"#)
            .expect_err("blank process name must be rejected");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("splitload.json");
        std::fs::write(&path, r#"{"refresh_freshness_marker":false}"#).expect("write config");
        let config = PipelineConfig::from_file(&path).expect("config file should parse");
        assert!(!config.refresh_freshness_marker);
    }
}
