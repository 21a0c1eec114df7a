use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

// ── Top-level config ──────────────────────────────────────────

/// Scheduling configuration, typically parsed from TOML.
///
/// ```toml
/// namespace = "default"
///
/// [clients.billing]
/// task_queue = "billing-tasks"
/// strategy = "priority+deadline"
///
/// [backpressure]
/// window_seconds = 60
/// throughput_factor = 10.0
///
/// [fairness]
/// half_life_seconds = 3600
///
/// [quotas]
/// acme = 2.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Namespace of the execution substrate.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Per-client settings keyed by client name.
    #[serde(default)]
    pub clients: HashMap<String, ClientConfig>,

    /// Global sliding-window throttle settings.
    #[serde(default)]
    pub backpressure: BackpressureConfig,

    /// EWMA decay settings for the fairness strategy.
    #[serde(default)]
    pub fairness: FairnessConfig,

    /// Tenant quotas used by the fairness strategy. Unknown tenants get 1.0.
    #[serde(default)]
    pub quotas: HashMap<String, f64>,
}

fn default_namespace() -> String {
    "default".into()
}

/// Settings for one logical client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Queue the dispatcher starts this client's work on.
    pub task_queue: String,
    /// `+`-joined strategy names, e.g. `"priority+deadline"`.
    pub strategy: String,
}

impl ClientConfig {
    pub fn new(task_queue: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            task_queue: task_queue.into(),
            strategy: strategy.into(),
        }
    }

    /// Strategy names in chain order.
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategy
            .split('+')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Longest accepted backpressure window (one week).
pub const MAX_WINDOW_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Sliding-window throttle section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackpressureConfig {
    /// Window length W in seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Target dispatches per second.
    #[serde(default = "default_throughput_factor")]
    pub throughput_factor: f64,
}

fn default_window_seconds() -> u64 { 60 }
fn default_throughput_factor() -> f64 { 10.0 }

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            throughput_factor: default_throughput_factor(),
        }
    }
}

/// Fairness decay section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessConfig {
    /// EWMA half-life in seconds.
    #[serde(default = "default_half_life")]
    pub half_life_seconds: u64,
}

fn default_half_life() -> u64 { 3600 }

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            half_life_seconds: default_half_life(),
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            clients: HashMap::new(),
            backpressure: BackpressureConfig::default(),
            fairness: FairnessConfig::default(),
            quotas: HashMap::new(),
        }
    }
}

impl SchedulingConfig {
    /// Parse config from a TOML string, apply `FAIRSCHED_*` env overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_overrides(env_opt);
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Register a client (builder style, mostly for tests and embedding).
    pub fn with_client(mut self, name: impl Into<String>, client: ClientConfig) -> Self {
        self.clients.insert(name.into(), client);
        self
    }

    /// Resolve a client by name.
    pub fn client(&self, name: &str) -> Result<&ClientConfig, ConfigError> {
        self.clients
            .get(name)
            .ok_or_else(|| ConfigError::UnknownClient(name.to_string()))
    }

    /// Quota for a tenant, defaulting to 1.0.
    pub fn quota(&self, tenant: &str) -> f64 {
        self.quotas.get(tenant).copied().unwrap_or(1.0)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply overrides for the global scalar settings.
    ///
    /// - `FAIRSCHED_NAMESPACE` -> `namespace`
    /// - `FAIRSCHED_BACKPRESSURE_WINDOW_SECONDS` -> `backpressure.window_seconds`
    /// - `FAIRSCHED_BACKPRESSURE_THROUGHPUT_FACTOR` -> `backpressure.throughput_factor`
    /// - `FAIRSCHED_FAIRNESS_HALF_LIFE_SECONDS` -> `fairness.half_life_seconds`
    ///
    /// Unparsable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FAIRSCHED_NAMESPACE") {
            self.namespace = v;
        }
        if let Some(v) = lookup("FAIRSCHED_BACKPRESSURE_WINDOW_SECONDS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.backpressure.window_seconds = secs;
            }
        }
        if let Some(v) = lookup("FAIRSCHED_BACKPRESSURE_THROUGHPUT_FACTOR") {
            if let Ok(factor) = v.parse::<f64>() {
                self.backpressure.throughput_factor = factor;
            }
        }
        if let Some(v) = lookup("FAIRSCHED_FAIRNESS_HALF_LIFE_SECONDS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.fairness.half_life_seconds = secs;
            }
        }
    }

    /// Validate numeric ranges and client entries.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backpressure.window_seconds == 0 {
            return Err(ConfigError::Invalid(
                "backpressure.window_seconds must be greater than zero".into(),
            ));
        }
        if self.backpressure.window_seconds > MAX_WINDOW_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "backpressure.window_seconds must be at most {MAX_WINDOW_SECONDS}, got {}",
                self.backpressure.window_seconds
            )));
        }
        let factor = self.backpressure.throughput_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "backpressure.throughput_factor must be positive, got {factor}"
            )));
        }
        if self.fairness.half_life_seconds == 0 {
            return Err(ConfigError::Invalid(
                "fairness.half_life_seconds must be greater than zero".into(),
            ));
        }
        for (tenant, quota) in &self.quotas {
            if !quota.is_finite() || *quota <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "quota for tenant '{tenant}' must be positive, got {quota}"
                )));
            }
        }
        for (name, client) in &self.clients {
            if client.task_queue.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "client '{name}' has an empty task_queue"
                )));
            }
            if client.strategy_names().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "client '{name}' has an empty strategy"
                )));
            }
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Scheduling config loaded (namespace: {}):", self.namespace);
        tracing::info!(
            "  backpressure: window={}s, limit={}/s",
            self.backpressure.window_seconds,
            self.backpressure.throughput_factor
        );
        tracing::info!("  fairness:     half_life={}s", self.fairness.half_life_seconds);
        tracing::info!("  quotas:       {} tenant(s)", self.quotas.len());
        let mut names: Vec<&String> = self.clients.keys().collect();
        names.sort();
        for name in names {
            let client = &self.clients[name];
            tracing::info!(
                "  client {}: queue={}, strategy={}",
                name,
                client.task_queue,
                client.strategy
            );
        }
    }
}
