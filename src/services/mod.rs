//! Services - business logic over the store
//!
//! - `validation` - Payload checks producing typed values
//! - `route_catalog` - Route CRUD and code generation
//! - `event_store` - Route interaction events
//! - `metric_store` - Vehicle telemetry samples
//! - `aggregation` - Per-route usage statistics
//! - `retention` - Background expiry of old records

pub mod aggregation;
pub mod event_store;
pub mod metric_store;
pub mod retention;
pub mod route_catalog;
pub mod validation;

pub use aggregation::Aggregator;
pub use event_store::{EventStore, RequestContext};
pub use metric_store::MetricStore;
pub use retention::RetentionSweeper;
pub use route_catalog::RouteCatalog;
