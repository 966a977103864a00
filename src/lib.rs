//! Transit route analytics
//!
//! Route catalog, usage event collection and real-time vehicle telemetry
//! behind an HTTP API, plus a client-side tracker that buffers events
//! while offline. Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod error;
pub mod infra;
pub mod io;
pub mod services;
pub mod tracker;

pub use error::{Error, Result};
