//! Real-time vehicle telemetry samples

use crate::domain::geo::GeoPoint;
use crate::domain::types::RouteId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A vehicle is on time while its delay stays at or below this (seconds)
pub const ON_TIME_THRESHOLD_SECS: i64 = 300;

/// Delay above which a sample is flagged as an anomaly (seconds)
pub const ANOMALY_DELAY_SECS: i64 = 900;

/// Metric retention window (days)
pub const METRIC_RETENTION_DAYS: i64 = 7;

#[inline]
pub fn is_on_time(delay_secs: i64) -> bool {
    delay_secs <= ON_TIME_THRESHOLD_SECS
}

/// Anomaly reason for a sample, if any
pub fn anomaly_reason(delay_secs: i64) -> Option<String> {
    (delay_secs > ANOMALY_DELAY_SECS)
        .then(|| format!("delay {delay_secs}s exceeds {ANOMALY_DELAY_SECS}s"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorStatus {
    Open,
    #[default]
    Closed,
    Closing,
    Opening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    #[default]
    Running,
    Idle,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherCondition {
    #[default]
    Clear,
    Cloudy,
    Rainy,
    Foggy,
    Snowy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    #[default]
    Gps,
    Api,
    Simulated,
    Manual,
}

/// Vehicle position with optional GPS accuracy (meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleLocation {
    #[serde(flatten)]
    pub point: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// One vehicle telemetry sample. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealTimeMetric {
    pub metric_id: String,
    pub vehicle_id: String,
    pub route_id: RouteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_code: Option<String>,
    pub current_location: VehicleLocation,
    pub timestamp: DateTime<Utc>,
    /// Percent of capacity, 0..=100
    pub occupancy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupancy_count: Option<u32>,
    /// Seconds behind schedule (negative when early)
    pub delay: i64,
    /// km/h
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_stop_id: Option<String>,
    #[serde(rename = "nextStopETA", default, skip_serializing_if = "Option::is_none")]
    pub next_stop_eta: Option<u64>,
    pub on_time_performance: bool,
    pub door_status: DoorStatus,
    pub engine_status: EngineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_arrival_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_arrival_time_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub weather_condition: WeatherCondition,
    pub is_anomaly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_reason: Option<String>,
    pub source: MetricSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_quality: Option<f64>,
}
