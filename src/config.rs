use crate::domain::types::Frequency;
use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine configuration. Every field has a default, so a partial file (or
/// no file at all) is valid.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Root of all actor journals. Default: `~/.employee-actors`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub supervision: SupervisionConfig,
    /// How long a query waits for the actor's reply. Default: 5000
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            journal: JournalConfig::default(),
            notifications: NotificationsConfig::default(),
            supervision: SupervisionConfig::default(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    // Falls back to a relative directory when no home directory exists
    paths::default_data_dir().unwrap_or_else(|_| PathBuf::from(".employee-actors"))
}

fn default_query_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JournalConfig {
    /// Snapshot after every N events (0 = disabled). Default: 50
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            snapshot_every: default_snapshot_every(),
        }
    }
}

fn default_snapshot_every() -> u64 {
    50
}

/// Settings of the digest scheduler and the activities it calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationsConfig {
    /// Frequency a newly onboarded employee starts with. Default: DAILY
    #[serde(default)]
    pub default_frequency: Frequency,
    #[serde(default)]
    pub default_paused: bool,
    #[serde(default = "default_compute_delay")]
    pub compute_delay: ActivityOptions,
    #[serde(default = "default_send_digest")]
    pub send_digest: ActivityOptions,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            default_frequency: Frequency::default(),
            default_paused: false,
            compute_delay: default_compute_delay(),
            send_digest: default_send_digest(),
        }
    }
}

fn default_compute_delay() -> ActivityOptions {
    ActivityOptions {
        timeout_ms: 3_000,
        retry: RetryPolicy::no_retry(),
    }
}

fn default_send_digest() -> ActivityOptions {
    ActivityOptions {
        timeout_ms: 120_000,
        retry: RetryPolicy::default(),
    }
}

/// Timeout and retry settings of one activity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActivityOptions {
    /// Start-to-close timeout of a single attempt.
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl ActivityOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retry policy for activity failures.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Default: 3
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait before the first retry. Default: 5000
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Multiplier applied to the wait after every retry. Default: 2.0
    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,
    /// Upper bound of a single wait. Default: 60000
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    5_000
}

fn default_backoff_coefficient() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            backoff_coefficient: default_backoff_coefficient(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Wait before the retry following `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.backoff_ms as f64 * self.backoff_coefficient.powi(exponent);
        let capped = scaled.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("{}: retry.max_attempts must be at least 1", name);
        }
        if !self.backoff_coefficient.is_finite() || self.backoff_coefficient < 1.0 {
            anyhow::bail!("{}: retry.backoff_coefficient must be >= 1.0", name);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisionConfig {
    /// Restarts allowed per child before the employee actor fails. Default: 3
    #[serde(default = "default_max_child_restarts")]
    pub max_child_restarts: u32,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            max_child_restarts: default_max_child_restarts(),
        }
    }
}

fn default_max_child_restarts() -> u32 {
    3
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("data_dir must not be empty");
        }
        if self.query_timeout_ms == 0 {
            anyhow::bail!("query_timeout_ms must be greater than zero");
        }
        if self.notifications.compute_delay.timeout_ms == 0 {
            anyhow::bail!("notifications.compute_delay.timeout_ms must be greater than zero");
        }
        if self.notifications.send_digest.timeout_ms == 0 {
            anyhow::bail!("notifications.send_digest.timeout_ms must be greater than zero");
        }
        self.notifications
            .compute_delay
            .retry
            .validate("notifications.compute_delay")?;
        self.notifications
            .send_digest
            .retry
            .validate("notifications.send_digest")?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
