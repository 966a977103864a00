//! Real-time metric store - vehicle telemetry ingestion and recent samples

use crate::domain::identity::new_uuid_v7;
use crate::domain::metric::{anomaly_reason, is_on_time, RealTimeMetric, VehicleLocation};
use crate::domain::types::RouteId;
use crate::error::Result;
use crate::infra::{Clock, Metrics, Store};
use crate::services::event_store::resolve_route;
use crate::services::validation::{validate_metric, MetricPayload};
use std::sync::Arc;
use tracing::{debug, warn};

/// Samples returned by `latest_metrics`
pub const LATEST_METRICS_LIMIT: u32 = 10;

#[derive(Clone)]
pub struct MetricStore {
    store: Store,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl MetricStore {
    pub fn new(store: Store, clock: Arc<dyn Clock>, metrics: Arc<Metrics>) -> Self {
        Self { store, clock, metrics }
    }

    /// Validate and persist one telemetry sample. Returns the generated metric id.
    pub fn record_metric(&self, payload: &MetricPayload) -> Result<String> {
        let valid =
            validate_metric(payload).inspect_err(|_| self.metrics.record_validation_failure())?;

        let route_code = resolve_route(&self.store, &self.metrics, &valid.route_id).map(|r| r.route_code);
        let anomaly_reason = anomaly_reason(valid.delay);

        let metric = RealTimeMetric {
            metric_id: new_uuid_v7(),
            vehicle_id: valid.vehicle_id,
            route_id: valid.route_id,
            route_code,
            current_location: VehicleLocation { point: valid.location, accuracy: valid.accuracy },
            timestamp: self.clock.now(),
            occupancy: valid.occupancy,
            occupancy_count: valid.occupancy_count,
            delay: valid.delay,
            speed: valid.speed,
            next_stop_id: valid.next_stop_id,
            next_stop_eta: valid.next_stop_eta,
            on_time_performance: is_on_time(valid.delay),
            door_status: valid.door_status,
            engine_status: valid.engine_status,
            predicted_arrival_time: valid.predicted_arrival_time,
            predicted_arrival_time_confidence: valid.predicted_arrival_time_confidence,
            temperature: valid.temperature,
            weather_condition: valid.weather_condition,
            is_anomaly: anomaly_reason.is_some(),
            anomaly_reason,
            source: valid.source,
            data_quality: valid.data_quality,
        };

        self.store.insert_metric(&metric).inspect_err(|_| self.metrics.record_store_error())?;
        self.metrics.record_metric();

        if let Some(reason) = &metric.anomaly_reason {
            warn!(
                vehicle_id = %metric.vehicle_id,
                route_id = %metric.route_id,
                reason = %reason,
                "metric_anomaly"
            );
        }
        debug!(
            metric_id = %metric.metric_id,
            vehicle_id = %metric.vehicle_id,
            delay = metric.delay,
            on_time = metric.on_time_performance,
            "metric_recorded"
        );
        Ok(metric.metric_id)
    }

    /// Most recent samples for a route, newest first
    pub fn latest_metrics(&self, route_id: &RouteId) -> Result<Vec<RealTimeMetric>> {
        self.store
            .latest_metrics(route_id, LATEST_METRICS_LIMIT)
            .inspect_err(|_| self.metrics.record_store_error())
    }
}
