//! # Gentree Configuration System
//!
//! Layered configuration read once at startup:
//!
//! 1. Built-in defaults (every field has one)
//! 2. `config/gentree.yaml`
//! 3. `config/gentree.{environment}.yaml`
//! 4. `GENTREE_*` environment variables (`__` separates nesting, e.g.
//!    `GENTREE_SCHEDULER__MAX_BRANCHING_FACTOR=5`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gentree_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let poll_every = manager.config().poller.poll_interval();
//! let branching = manager.config().scheduler.max_branching_factor;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/gentree.yaml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GentreeConfig {
    /// Tree store connection settings
    pub database: DatabaseConfig,

    /// External compute service client settings
    pub compute: ComputeConfig,

    /// Submitter loop and tree expansion settings
    pub scheduler: SchedulerConfig,

    /// Poller loop and maintenance settings
    pub poller: PollerConfig,

    /// Where produced artifacts are resolved to
    pub artifacts: ArtifactConfig,

    /// Structured logging settings
    pub logging: LoggingConfig,
}

/// Tree store connection and pooling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection url, e.g. `sqlite://data/gentree.db`
    pub url: String,
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/gentree.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// External compute service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub base_url: String,
    /// Per-call timeout
    pub request_timeout_ms: u64,
    /// Retry budget for server errors within one call, and for connection
    /// failures across polls of one job
    pub max_retries: u32,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8188".to_string(),
            request_timeout_ms: 30_000,
            max_retries: 3,
        }
    }
}

impl ComputeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Submitter loop and tree expansion configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub submit_interval_ms: u64,
    /// Global upper bound on children per node, applied on top of each step's cap
    pub max_branching_factor: i64,
    /// Parents whose failure_count exceeds this are never selected again
    pub max_parent_failures: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            submit_interval_ms: 5_000,
            max_branching_factor: 8,
            max_parent_failures: 3,
        }
    }
}

impl SchedulerConfig {
    pub fn submit_interval(&self) -> Duration {
        Duration::from_millis(self.submit_interval_ms)
    }
}

/// Poller loop and maintenance configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerConfig {
    pub poll_interval_ms: u64,
    /// 0 disables stale job reclamation
    pub stale_job_timeout_seconds: u64,
    pub reconcile_interval_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            stale_job_timeout_seconds: 21_600,
            reconcile_interval_ms: 600_000,
        }
    }
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `None` when reclamation is disabled
    pub fn stale_job_timeout(&self) -> Option<Duration> {
        (self.stale_job_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.stale_job_timeout_seconds))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }
}

/// Artifact resolution configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Directory the compute service writes its outputs into
    pub root: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("output"),
        }
    }
}

/// Structured logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines on the console instead of human-readable output
    pub json: bool,
    /// Optional directory for a JSON log file
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

impl GentreeConfig {
    /// Reject values the loops cannot run with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.database.url.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "database.url",
                "database configuration",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "pool size must be greater than 0",
            ));
        }

        if self.compute.base_url.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "compute.base_url",
                "compute configuration",
            ));
        }

        if self.compute.request_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "compute.request_timeout_ms",
                "0",
                "external calls must carry a bounded timeout",
            ));
        }

        if self.scheduler.submit_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.submit_interval_ms",
                "0",
                "interval must be greater than 0",
            ));
        }

        if self.scheduler.max_branching_factor < 1 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_branching_factor",
                self.scheduler.max_branching_factor.to_string(),
                "every node must be allowed at least one child",
            ));
        }

        if self.scheduler.max_parent_failures < 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_parent_failures",
                self.scheduler.max_parent_failures.to_string(),
                "failure ceiling cannot be negative",
            ));
        }

        if self.poller.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "poller.poll_interval_ms",
                "0",
                "interval must be greater than 0",
            ));
        }

        if self.poller.reconcile_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "poller.reconcile_interval_ms",
                "0",
                "interval must be greater than 0",
            ));
        }

        Ok(())
    }
}
