//! Infrastructure - configuration, clock, metrics, and storage
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults, env overrides)
//! - `clock` - Injectable wall clock
//! - `metrics` - Lock-free metrics collection
//! - `store` - SQLite document store

pub mod clock;
pub mod config;
pub mod metrics;
pub mod store;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use metrics::Metrics;
pub use store::Store;
