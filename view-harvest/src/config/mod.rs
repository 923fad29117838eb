//! Application configuration.
//!
//! Values come from an optional TOML file, then `VIEW_HARVEST_*` environment
//! variables (a `.env` file is honoured), then the defaults below.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::HttpApiConfig;
use crate::logging::LoggingOptions;
use crate::selector::{RuleTemplate, default_rule_templates};
use crate::{Error, Result};

/// Prefix of the environment overrides.
pub const ENV_PREFIX: &str = "VIEW_HARVEST_";

/// Which backend runs a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Client-side, one task at a time.
    #[default]
    Serial,
    /// Server-side jobs followed by polling.
    Polling,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Polling => "polling",
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(Self::Serial),
            "polling" | "job" | "jobs" => Ok(Self::Polling),
            other => Err(Error::config(format!("unknown execution mode '{}'", other))),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Root of the automation and report API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Bearer token for the API.
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Job poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause between serial tasks in milliseconds.
    #[serde(default = "default_task_delay_ms")]
    pub task_delay_ms: u64,
    /// Upper bound on one direct workflow execution in milliseconds.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    /// Capacity of the session event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Whether finished sessions are written to the report store.
    #[serde(default = "default_true")]
    pub persist_reports: bool,
    /// Keyword classifiers mapping workflow names to day ranges.
    #[serde(default = "default_rule_templates")]
    pub workflow_rules: Vec<RuleTemplate>,
    /// Result keys holding the view count, highest priority first.
    #[serde(default = "default_view_count_keys")]
    pub view_count_keys: Vec<String>,
    #[serde(default)]
    pub logging: LoggingOptions,
}

fn default_api_base_url() -> String {
    "http://localhost:3000/api/".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_task_delay_ms() -> u64 {
    2000
}

fn default_task_timeout_ms() -> u64 {
    120_000
}

fn default_event_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn default_view_count_keys() -> Vec<String> {
    view_parser::VIEW_COUNT_KEYS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_token: None,
            mode: ExecutionMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            task_delay_ms: default_task_delay_ms(),
            task_timeout_ms: default_task_timeout_ms(),
            event_capacity: default_event_capacity(),
            persist_reports: default_true(),
            workflow_rules: default_rule_templates(),
            view_count_keys: default_view_count_keys(),
            logging: LoggingOptions::default(),
        }
    }
}

impl HarvestConfig {
    /// Load from an optional TOML file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                let config = Self::from_toml(&content)?;
                debug!(path = %path.display(), "Loaded configuration file");
                config
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("invalid configuration: {}", e)))
    }

    /// Apply `VIEW_HARVEST_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get("API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(token) = get("API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Some(mode) = get("MODE") {
            self.mode = mode.parse()?;
        }
        if let Some(value) = get("POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_env("POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = get("TASK_DELAY_MS") {
            self.task_delay_ms = parse_env("TASK_DELAY_MS", &value)?;
        }
        if let Some(value) = get("TASK_TIMEOUT_MS") {
            self.task_timeout_ms = parse_env("TASK_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = get("PERSIST_REPORTS") {
            self.persist_reports = parse_env("PERSIST_REPORTS", &value)?;
        }
        if let Some(dir) = get("LOG_DIR") {
            self.logging.log_dir = Some(dir.into());
        }
        if let Some(filter) = get("LOG_FILTER") {
            self.logging.filter = Some(filter);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(Error::config("api_base_url must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config("poll_interval_ms must be greater than zero"));
        }
        if self.task_timeout_ms == 0 {
            return Err(Error::config("task_timeout_ms must be greater than zero"));
        }
        if self.event_capacity == 0 {
            return Err(Error::config("event_capacity must be greater than zero"));
        }
        if self.view_count_keys.is_empty() {
            return Err(Error::config("view_count_keys must not be empty"));
        }
        for template in &self.workflow_rules {
            template.validate()?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn task_delay(&self) -> Duration {
        Duration::from_millis(self.task_delay_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// Settings for [`crate::client::HttpApiClient`].
    pub fn http_config(&self) -> HttpApiConfig {
        HttpApiConfig {
            base_url: self.api_base_url.clone(),
            token: self.api_token.clone(),
            execute_timeout: self.task_timeout(),
            ..Default::default()
        }
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::config(format!("invalid value '{}' for {ENV_PREFIX}{}", value, name)))
}
