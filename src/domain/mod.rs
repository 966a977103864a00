//! Domain models - core business types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Route` - static transit line definition
//! - `RouteEvent` - anonymized user interaction with a route
//! - `RealTimeMetric` - vehicle telemetry sample
//! - `RouteStats` - per-route usage rollup
//! - `geo` / `identity` - distance and pseudonymous id helpers

pub mod event;
pub mod geo;
pub mod identity;
pub mod metric;
pub mod route;
pub mod stats;
pub mod types;

// Re-export commonly used types at module level
pub use event::{ActionResult, DeviceInfo, EventType, RouteEvent, TemporalContext};
pub use geo::{distance_km, GeoPoint};
pub use metric::RealTimeMetric;
pub use route::Route;
pub use stats::{EventTotals, RouteStats};
pub use types::RouteId;
