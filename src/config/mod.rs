use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ops::claims::score::EvidencePolicy;
use crate::ops::dispatch::domain::DispatchPolicy;
use crate::ops::matching::domain::MatchPolicy;
use crate::ops::oncall::domain::EscalationSchedule;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the gating binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub policy_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );
        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let policy_file = match env::var("APP_POLICY_FILE") {
            Ok(path) if !path.trim().is_empty() => {
                let path = PathBuf::from(path);
                if !path.is_file() {
                    return Err(ConfigError::PolicyFileMissing { path });
                }
                Some(path)
            }
            _ => None,
        };

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            policy_file,
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Deployment overrides for the four engine policies. A JSON file may
/// carry any subset of sections; everything missing stays at its default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyBundle {
    #[serde(default)]
    pub evidence: EvidencePolicy,
    #[serde(default)]
    pub matching: MatchPolicy,
    #[serde(default)]
    pub dispatch: DispatchPolicy,
    #[serde(default)]
    pub escalation: EscalationSchedule,
}

impl PolicyBundle {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::PolicyFileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::PolicyFileParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    PolicyFileMissing {
        path: PathBuf,
    },
    PolicyFileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    PolicyFileParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::PolicyFileMissing { path } => {
                write!(f, "APP_POLICY_FILE '{}' does not exist", path.display())
            }
            ConfigError::PolicyFileRead { path, .. } => {
                write!(f, "failed to read policy file '{}'", path.display())
            }
            ConfigError::PolicyFileParse { path, .. } => {
                write!(f, "policy file '{}' is not valid JSON", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::PolicyFileMissing { .. } => None,
            ConfigError::PolicyFileRead { source, .. } => Some(source),
            ConfigError::PolicyFileParse { source, .. } => Some(source),
        }
    }
}
