//! Per-route usage statistics

use crate::domain::stats::{EventTotals, RouteStats};
use crate::domain::types::RouteId;
use crate::error::Result;
use crate::infra::{Metrics, Store};
use std::sync::Arc;

/// Round to two decimal places
#[inline]
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Turn raw totals into the published statistics
pub fn summarize(totals: EventTotals) -> RouteStats {
    if totals.total == 0 {
        return RouteStats::default();
    }
    RouteStats {
        total_events: totals.total,
        unique_users: totals.unique_users,
        success_rate: round2(totals.success_count as f64 / totals.total as f64 * 100.0),
        avg_session_duration: totals.avg_session_duration.map_or(0, |v| v.round() as i64),
        avg_duration_on_route: totals.avg_duration_on_route.map_or(0, |v| v.round() as i64),
    }
}

/// Computes statistics on demand; nothing is cached
#[derive(Clone)]
pub struct Aggregator {
    store: Store,
    metrics: Arc<Metrics>,
}

impl Aggregator {
    pub fn new(store: Store, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    pub fn compute_stats(&self, route_id: &RouteId) -> Result<RouteStats> {
        let totals = self
            .store
            .event_totals(route_id)
            .inspect_err(|_| self.metrics.record_store_error())?;
        Ok(summarize(totals))
    }
}
