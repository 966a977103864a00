//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! `PORT` and `DATABASE_URL` environment variables override the file.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// SQLite path, or ":memory:"
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

fn default_database_url() -> String {
    "data/transit.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { database_url: default_database_url() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_events_days")]
    pub events_days: i64,
    #[serde(default = "default_metrics_days")]
    pub metrics_days: i64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_events_days() -> i64 {
    30
}

fn default_metrics_days() -> i64 {
    7
}

fn default_sweep_interval() -> u64 {
    3600
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            events_days: default_events_days(),
            metrics_days: default_metrics_days(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Base URL of the analytics API
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    /// JSON file holding events not yet delivered
    #[serde(default = "default_queue_file")]
    pub queue_file: String,
}

fn default_api_base() -> String {
    "http://localhost:5000".to_string()
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_sync_interval() -> u64 {
    30
}

fn default_queue_file() -> String {
    "pending_events.json".to_string()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_ms: default_request_timeout(),
            sync_interval_secs: default_sync_interval(),
            queue_file: default_queue_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_sim_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_vehicles_per_route")]
    pub vehicles_per_route: u32,
}

fn default_sim_interval() -> u64 {
    10
}

fn default_vehicles_per_route() -> u32 {
    2
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self { interval_secs: default_sim_interval(), vehicles_per_route: default_vehicles_per_route() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    bind_address: String,
    port: u16,
    database_url: String,
    events_retention_days: i64,
    metrics_retention_days: i64,
    sweep_interval_secs: u64,
    api_base: String,
    request_timeout_ms: u64,
    sync_interval_secs: u64,
    queue_file: String,
    sim_interval_secs: u64,
    sim_vehicles_per_route: u32,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            bind_address: toml_config.server.bind_address,
            port: toml_config.server.port,
            database_url: toml_config.storage.database_url,
            events_retention_days: toml_config.retention.events_days,
            metrics_retention_days: toml_config.retention.metrics_days,
            sweep_interval_secs: toml_config.retention.sweep_interval_secs,
            api_base: toml_config.tracker.api_base,
            request_timeout_ms: toml_config.tracker.request_timeout_ms,
            sync_interval_secs: toml_config.tracker.sync_interval_secs,
            queue_file: toml_config.tracker.queue_file,
            sim_interval_secs: toml_config.simulator.interval_secs,
            sim_vehicles_per_route: toml_config.simulator.vehicles_per_route,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load from a path, falling back to defaults, then apply env overrides
    pub fn load_from_path(path: &str) -> Self {
        let config = match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        };
        config.with_env_overrides(|key| env::var(key).ok())
    }

    /// Apply `PORT` and `DATABASE_URL` overrides from a variable lookup
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
            self.database_url = url;
        }
        self
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn events_retention_days(&self) -> i64 {
        self.events_retention_days
    }

    pub fn metrics_retention_days(&self) -> i64 {
        self.metrics_retention_days
    }

    pub fn sweep_interval_secs(&self) -> u64 {
        self.sweep_interval_secs
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms
    }

    pub fn sync_interval_secs(&self) -> u64 {
        self.sync_interval_secs
    }

    pub fn queue_file(&self) -> &str {
        &self.queue_file
    }

    pub fn sim_interval_secs(&self) -> u64 {
        self.sim_interval_secs
    }

    pub fn sim_vehicles_per_route(&self) -> u32 {
        self.sim_vehicles_per_route
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point at a different API
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }
}
