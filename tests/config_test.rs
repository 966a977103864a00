//! Integration tests for configuration loading

use std::io::Write;
use tempfile::NamedTempFile;
use transit_analytics::infra::Config;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[server]
bind_address = "127.0.0.1"
port = 8081

[storage]
database_url = "/var/lib/transit/analytics.db"

[retention]
events_days = 14
metrics_days = 3
sweep_interval_secs = 600

[tracker]
api_base = "https://api.example.test"
request_timeout_ms = 2500
sync_interval_secs = 15
queue_file = "/tmp/pending.json"

[simulator]
interval_secs = 5
vehicles_per_route = 4
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.bind_address(), "127.0.0.1");
    assert_eq!(config.port(), 8081);
    assert_eq!(config.database_url(), "/var/lib/transit/analytics.db");
    assert_eq!(config.events_retention_days(), 14);
    assert_eq!(config.metrics_retention_days(), 3);
    assert_eq!(config.sweep_interval_secs(), 600);
    assert_eq!(config.api_base(), "https://api.example.test");
    assert_eq!(config.request_timeout_ms(), 2500);
    assert_eq!(config.sync_interval_secs(), 15);
    assert_eq!(config.queue_file(), "/tmp/pending.json");
    assert_eq!(config.sim_interval_secs(), 5);
    assert_eq!(config.sim_vehicles_per_route(), 4);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_invalid_file_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[server]\nport = \"not a number\"\n").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config file"));
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.events_retention_days(), 30);
    assert_eq!(config.metrics_retention_days(), 7);
    assert_eq!(config.api_base(), "http://localhost:5000");
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_shipped_dev_config_parses() {
    let config = Config::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml")).unwrap();
    assert_eq!(config.port(), 5000);
    assert_eq!(config.queue_file(), "data/pending_events.json");
}
