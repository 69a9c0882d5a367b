//! Tracker configuration loading and validation.
//!
//! # Responsibility
//! - Provide defaults matching the hosted tracking service.
//! - Load overrides from environment variables or a JSON document.
//!
//! # Invariants
//! - A returned `TrackerConfig` is always validated.
//! - `api_base_url` never ends with `/`.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_SELECTIONS: usize = 2;

pub const ENV_API_URL: &str = "SATTRACK_API_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "SATTRACK_POLL_INTERVAL_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "SATTRACK_REQUEST_TIMEOUT_MS";
pub const ENV_MAX_SELECTIONS: &str = "SATTRACK_MAX_SELECTIONS";

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber { key: &'static str, value: String },
    InvalidBaseUrl(String),
    ZeroDuration(&'static str),
    InvalidMaxSelections(usize),
    Json(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber { key, value } => {
                write!(f, "`{key}` must be a non-negative integer, got `{value}`")
            }
            Self::InvalidBaseUrl(value) => {
                write!(f, "api base url must start with http:// or https://, got `{value}`")
            }
            Self::ZeroDuration(key) => write!(f, "`{key}` must be greater than zero"),
            Self::InvalidMaxSelections(value) => {
                write!(f, "max selections must be at least 1, got {value}")
            }
            Self::Json(err) => write!(f, "invalid config json: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Runtime settings of one tracking session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub api_base_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Local precondition only; the remote service stays authoritative.
    pub max_selections: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            max_selections: DEFAULT_MAX_SELECTIONS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    api_base_url: Option<String>,
    poll_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    max_selections: Option<usize>,
}

impl TrackerConfig {
    /// Loads configuration from `SATTRACK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// Blank values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value_of = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let raw = RawConfig {
            api_base_url: value_of(ENV_API_URL),
            poll_interval_ms: parse_number(ENV_POLL_INTERVAL_MS, value_of(ENV_POLL_INTERVAL_MS))?,
            request_timeout_ms: parse_number(
                ENV_REQUEST_TIMEOUT_MS,
                value_of(ENV_REQUEST_TIMEOUT_MS),
            )?,
            max_selections: parse_number(ENV_MAX_SELECTIONS, value_of(ENV_MAX_SELECTIONS))?,
        };
        Self::from_raw(raw)
    }

    /// Parses a JSON document with optional snake_case keys.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Checks invariants and normalizes the base URL.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        let trimmed = self.api_base_url.trim().trim_end_matches('/').to_string();
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.api_base_url));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("poll_interval_ms"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request_timeout_ms"));
        }
        if self.max_selections == 0 {
            return Err(ConfigError::InvalidMaxSelections(self.max_selections));
        }
        self.api_base_url = trimmed;
        Ok(self)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Self {
            api_base_url: raw.api_base_url.unwrap_or(defaults.api_base_url),
            poll_interval: raw
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            request_timeout: raw
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            max_selections: raw.max_selections.unwrap_or(defaults.max_selections),
        }
        .validated()
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| ConfigError::InvalidNumber { key, value: raw })
        })
        .transpose()
}
