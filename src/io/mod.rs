//! IO modules - external interfaces
//!
//! - `http` - HTTP API server (hyper)
//! - `prometheus` - Prometheus text exposition for `/metrics`
//! - `api_client` - reqwest client for the API, used by the tracker and simulator

pub mod api_client;
pub mod http;
pub mod prometheus;

pub use api_client::{ApiClient, EventAck};
pub use http::{serve, start_api_server, AppState};
