// src/config.rs

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::logging::get_data_dir;

pub const ENV_SOFT_TIME_LIMIT: &str = "VANGUARD_SOFT_TIME_LIMIT";
pub const ENV_HARD_TIME_LIMIT: &str = "VANGUARD_HARD_TIME_LIMIT";
pub const ENV_REQUEST_TIMEOUT: &str = "VANGUARD_REQUEST_TIMEOUT";
pub const ENV_DEBUG: &str = "VANGUARD_DEBUG";
pub const ENV_USER_AGENT: &str = "VANGUARD_USER_AGENT";
pub const ENV_DATA_DIR: &str = "VANGUARD_DATA_DIR";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a whole number of seconds, got '{value}'")]
    InvalidSeconds { name: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("hard time limit ({hard:?}) must not be shorter than the soft time limit ({soft:?})")]
    HardBelowSoft { soft: Duration, hard: Duration },
}

/// Execution budgets and the diagnostic switch handed to the scan controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    /// Budget for retrieval; exceeding it aborts the scan gracefully.
    pub soft_time_limit: Duration,
    /// Budget for the whole task body; the in-flight work is dropped.
    pub hard_time_limit: Duration,
    /// Emit full failure detail (error chain and span trace) on unexpected errors.
    pub debug: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            soft_time_limit: Duration::from_secs(60),
            hard_time_limit: Duration::from_secs(90),
            debug: false,
        }
    }
}

impl TaskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.soft_time_limit.is_zero() {
            return Err(ConfigError::Zero(ENV_SOFT_TIME_LIMIT));
        }
        if self.hard_time_limit.is_zero() {
            return Err(ConfigError::Zero(ENV_HARD_TIME_LIMIT));
        }
        if self.hard_time_limit < self.soft_time_limit {
            return Err(ConfigError::HardBelowSoft {
                soft: self.soft_time_limit,
                hard: self.hard_time_limit,
            });
        }
        Ok(())
    }
}

/// Process settings for the worker binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub task: TaskConfig,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            task: TaskConfig::default(),
            request_timeout: Duration::from_secs(20),
            user_agent: format!("VanguardRS/{}", env!("CARGO_PKG_VERSION")),
            data_dir: get_data_dir().join("scans"),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable source, falling back to
    /// defaults for anything unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let seconds = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(name) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidSeconds { name, value }),
            }
        };

        let settings = Self {
            task: TaskConfig {
                soft_time_limit: seconds(ENV_SOFT_TIME_LIMIT, defaults.task.soft_time_limit)?,
                hard_time_limit: seconds(ENV_HARD_TIME_LIMIT, defaults.task.hard_time_limit)?,
                debug: lookup(ENV_DEBUG).is_some_and(|v| is_truthy(&v)),
            },
            request_timeout: seconds(ENV_REQUEST_TIMEOUT, defaults.request_timeout)?,
            user_agent: lookup(ENV_USER_AGENT).unwrap_or(defaults.user_agent),
            data_dir: lookup(ENV_DATA_DIR).map(PathBuf::from).unwrap_or(defaults.data_dir),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.task.validate()?;
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Zero(ENV_REQUEST_TIMEOUT));
        }
        Ok(())
    }
}

// Presence alone turns the flag on, except for explicit negatives.
fn is_truthy(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}
