//! Runtime configuration.
//!
//! The worker runtime is configured from YAML, from the environment, or both
//! (environment values override the file).
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! worker_threads: 4
//! worker_thread_name: "hmsearch-worker"
//! delivery_thread_name: "hmsearch-delivery"
//! drain_policy: "reject_new"
//! ```
//!
//! ## Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `HMSEARCH_WORKER_THREADS` | `worker_threads` |
//! | `HMSEARCH_DRAIN_POLICY` | `drain_policy` (`reject_new` / `admit_new`) |

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_WORKER_THREADS: &str = "HMSEARCH_WORKER_THREADS";
pub const ENV_DRAIN_POLICY: &str = "HMSEARCH_DRAIN_POLICY";

/// Errors that can occur when loading runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },
}

/// Whether new operations may acquire a handle while a close is draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Once a close is accepted, acquisitions fail as if the handle were closed.
    #[default]
    RejectNew,
    /// Acquisitions succeed until the handle is actually detached. A steady
    /// stream of operations can postpone the close indefinitely.
    AdmitNew,
}

impl DrainPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrainPolicy::RejectNew => "reject_new",
            DrainPolicy::AdmitNew => "admit_new",
        }
    }
}

impl FromStr for DrainPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject_new" | "reject" => Ok(DrainPolicy::RejectNew),
            "admit_new" | "admit" => Ok(DrainPolicy::AdmitNew),
            other => Err(format!("unknown drain policy: {other}")),
        }
    }
}

/// Worker runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Configuration format version
    #[serde(default = "default_version")]
    pub version: String,

    /// Upper bound on threads executing asynchronous tasks.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    #[serde(default = "default_worker_thread_name")]
    pub worker_thread_name: String,

    #[serde(default = "default_delivery_thread_name")]
    pub delivery_thread_name: String,

    #[serde(default)]
    pub drain_policy: DrainPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            worker_threads: default_worker_threads(),
            worker_thread_name: default_worker_thread_name(),
            delivery_thread_name: default_delivery_thread_name(),
            drain_policy: DrainPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Apply `HMSEARCH_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_WORKER_THREADS) {
            self.worker_threads = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_WORKER_THREADS,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_DRAIN_POLICY) {
            self.drain_policy = value.parse().map_err(|_| ConfigError::Env {
                var: ENV_DRAIN_POLICY,
                value: value.clone(),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_drain_policy(mut self, drain_policy: DrainPolicy) -> Self {
        self.drain_policy = drain_policy;
        self
    }

    pub fn with_thread_names(
        mut self,
        worker: impl Into<String>,
        delivery: impl Into<String>,
    ) -> Self {
        self.worker_thread_name = worker.into();
        self.delivery_thread_name = delivery.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.version.as_str() {
            "1.0" | "1" => {}
            v => return Err(ConfigError::UnsupportedVersion(v.to_string())),
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Validation(
                "worker_threads must be greater than 0".into(),
            ));
        }
        if self.worker_thread_name.trim().is_empty() || self.delivery_thread_name.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "thread names must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_worker_threads() -> usize {
    4
}

fn default_worker_thread_name() -> String {
    "hmsearch-worker".to_string()
}

fn default_delivery_thread_name() -> String {
    "hmsearch-delivery".to_string()
}
