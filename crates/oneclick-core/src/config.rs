use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_CONFIG_PATH: &str = "oneclick.toml";
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 1; // polling granularity of the trigger
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 300;
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_MAX_QUEUE: usize = 256;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
pub const DEFAULT_STALE_AFTER_SECS: u64 = 900;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Top-level config (oneclick.toml + ONECLICK_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneclickConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// How a failed attempt re-enters the eligibility window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryTiming {
    /// Push `schedule_time` forward by `retry_delay_secs`.
    #[default]
    Delayed,
    /// Leave `schedule_time` untouched; the job is due again on the next tick.
    Immediate,
}

/// Polling engine and retry policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default)]
    pub retry_timing: RetryTiming,
    /// Executions allowed in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Claimed jobs allowed to wait for a free worker. A tick claims no more
    /// than the remaining room.
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Jobs stuck in `executing` for longer than this are treated as a failed
    /// attempt. `0` disables the sweep.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            retry_timing: RetryTiming::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_queue: DEFAULT_MAX_QUEUE,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn stale_after(&self) -> Option<Duration> {
        (self.stale_after_secs > 0).then(|| Duration::from_secs(self.stale_after_secs))
    }
}

/// The external provisioning endpoint that due jobs are submitted to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    pub api_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
    /// HTTP status codes that mean "do not retry". Empty by default, so every
    /// failure is retried until the budget runs out.
    #[serde(default)]
    pub permanent_statuses: Vec<u16>,
}

impl ProvisioningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `oneclick_scheduler=debug`.
    /// `RUST_LOG` wins when set.
    pub level: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
    /// Log file path. `None` or `"stdout"` writes to stdout.
    pub output: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    "oneclick.db".to_string()
}
fn default_check_interval_secs() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}
fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}
fn default_max_queue() -> usize {
    DEFAULT_MAX_QUEUE
}
fn default_shutdown_grace_secs() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}
fn default_stale_after_secs() -> u64 {
    DEFAULT_STALE_AFTER_SECS
}
fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl OneclickConfig {
    /// Load config from a TOML file with environment overrides, then validate.
    ///
    /// Sources, later ones winning:
    ///   1. the TOML file (`config_path`, else `oneclick.toml`)
    ///   2. legacy variables `PROVISIONING_API_URL`, `SCHEDULER_INTERVAL`, `LOG_LEVEL`
    ///   3. `ONECLICK_*` variables, `__` between nesting levels
    ///      (`ONECLICK_SCHEDULER__MAX_RETRIES=5`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_PATH);

        let config: OneclickConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(legacy_env())
            .merge(Env::prefixed("ONECLICK_").split("__"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let url = self.provisioning.api_url.trim();
        if url.is_empty() {
            return Err(CoreError::InvalidConfig(
                "provisioning.api_url is required".into(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CoreError::InvalidConfig(format!(
                "provisioning.api_url must be an http(s) URL, got {url:?}"
            )));
        }
        if self.provisioning.timeout_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "provisioning.timeout_secs must be positive".into(),
            ));
        }
        if self.scheduler.check_interval_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "scheduler.check_interval_secs must be positive".into(),
            ));
        }
        if self.scheduler.max_concurrency == 0 {
            return Err(CoreError::InvalidConfig(
                "scheduler.max_concurrency must be positive".into(),
            ));
        }
        if self.scheduler.max_queue == 0 {
            return Err(CoreError::InvalidConfig(
                "scheduler.max_queue must be positive".into(),
            ));
        }
        // A job still inside its request timeout must never look abandoned.
        let stale = self.scheduler.stale_after_secs;
        if stale > 0 && stale <= self.provisioning.timeout_secs {
            return Err(CoreError::InvalidConfig(format!(
                "scheduler.stale_after_secs ({stale}) must exceed provisioning.timeout_secs ({})",
                self.provisioning.timeout_secs
            )));
        }
        Ok(())
    }
}

/// Environment variable names understood by earlier deployments.
fn legacy_env() -> Figment {
    Figment::new()
        .merge(
            Env::raw()
                .only(&["PROVISIONING_API_URL"])
                .map(|_| "provisioning.api_url".into()),
        )
        .merge(
            Env::raw()
                .only(&["SCHEDULER_INTERVAL"])
                .map(|_| "scheduler.check_interval_secs".into()),
        )
        .merge(
            Env::raw()
                .only(&["LOG_LEVEL"])
                .map(|_| "logging.level".into()),
        )
}
