//! Request payload validation
//!
//! Payloads are deserialized with every field optional so that a missing
//! field surfaces as a field-level `Error::Validation` rather than a decode
//! failure. Each `validate_*` returns a typed value that the stores accept;
//! nothing reaches storage without passing through here. External
//! coordinates are `[lat, lon]`; the swap to stored `[lon, lat]` happens here.

use crate::domain::event::{ActionResult, DeviceInfo, EventType};
use crate::domain::geo::GeoPoint;
use crate::domain::metric::{DoorStatus, EngineStatus, MetricSource, WeatherCondition};
use crate::domain::route::{Frequency, VehicleType};
use crate::domain::types::RouteId;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const DEFAULT_QUERY_DAYS: u32 = 7;
pub const DEFAULT_QUERY_LIMIT: u32 = 100;

/// Longest accepted session or on-route duration (one year)
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 3600;

// -------------------------------------------------------------------------
// Shared field checks
// -------------------------------------------------------------------------

/// Treat absent and empty strings alike
fn required_str(field: &'static str, value: Option<&str>) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::validation(field, "is required")),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Validate an external `[lat, lon]` pair
pub fn lat_lon(field: &'static str, pair: &[f64]) -> Result<GeoPoint> {
    let [lat, lon] = pair else {
        return Err(Error::validation(field, "must be a [lat, lon] pair"));
    };
    if !lat.is_finite() || !(-90.0..=90.0).contains(lat) {
        return Err(Error::validation(field, format!("latitude {lat} out of range")));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(lon) {
        return Err(Error::validation(field, format!("longitude {lon} out of range")));
    }
    Ok(GeoPoint::from_lat_lon(*lat, *lon))
}

fn seconds(field: &'static str, value: Option<f64>) -> Result<Option<u64>> {
    match value {
        None => Ok(None),
        Some(v) if v.is_finite() && v >= 0.0 && v.round() <= MAX_DURATION_SECS as f64 => {
            Ok(Some(v.round() as u64))
        }
        Some(v) => Err(Error::validation(
            field,
            format!("must be between 0 and {MAX_DURATION_SECS} seconds, got {v}"),
        )),
    }
}

fn in_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<f64> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(Error::validation(field, format!("must be between {min} and {max}, got {value}")))
    }
}

fn parse_enum<T: std::str::FromStr<Err = String>>(field: &'static str, value: &str) -> Result<T> {
    value.parse().map_err(|e: String| Error::validation(field, e))
}

// -------------------------------------------------------------------------
// Route events
// -------------------------------------------------------------------------

/// Body of `POST /api/events`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub event_type: Option<String>,
    pub route_id: Option<String>,
    /// `[lat, lon]`
    pub user_location: Option<Vec<f64>>,
    pub session_duration: Option<f64>,
    pub duration_on_route: Option<f64>,
    pub device_info: Option<DeviceInfo>,
    pub search_query: Option<String>,
    pub action_result: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidEvent {
    pub event_type: EventType,
    pub route_id: RouteId,
    pub user_location: Option<GeoPoint>,
    pub session_duration: Option<u64>,
    pub duration_on_route: Option<u64>,
    pub device_info: Option<DeviceInfo>,
    pub search_query: Option<String>,
    pub action_result: ActionResult,
}

pub fn validate_event(payload: &EventPayload) -> Result<ValidEvent> {
    let event_type = required_str("eventType", payload.event_type.as_deref())?;
    let route_id = required_str("routeId", payload.route_id.as_deref())?;

    Ok(ValidEvent {
        event_type: parse_enum("eventType", &event_type)?,
        route_id: RouteId(route_id),
        user_location: payload
            .user_location
            .as_deref()
            .map(|p| lat_lon("userLocation", p))
            .transpose()?,
        session_duration: seconds("sessionDuration", payload.session_duration)?,
        duration_on_route: seconds("durationOnRoute", payload.duration_on_route)?,
        device_info: payload.device_info.clone(),
        search_query: non_empty(payload.search_query.as_deref()),
        action_result: match non_empty(payload.action_result.as_deref()) {
            Some(r) => parse_enum("actionResult", &r)?,
            None => ActionResult::default(),
        },
    })
}

/// Query string of `GET /api/events/:routeId`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQuery {
    pub days: u32,
    pub limit: u32,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self { days: DEFAULT_QUERY_DAYS, limit: DEFAULT_QUERY_LIMIT }
    }
}

/// Parse `days` and `limit` from a raw query string. Unknown keys are ignored.
pub fn parse_event_query(query: Option<&str>) -> Result<EventQuery> {
    let mut parsed = EventQuery::default();
    for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "days" => {
                parsed.days = value
                    .parse()
                    .map_err(|_| Error::validation("days", format!("invalid value '{value}'")))?;
            }
            "limit" => {
                parsed.limit = value
                    .parse()
                    .ok()
                    .filter(|l| *l > 0)
                    .ok_or_else(|| Error::validation("limit", format!("invalid value '{value}'")))?;
            }
            _ => {}
        }
    }
    Ok(parsed)
}

// -------------------------------------------------------------------------
// Real-time metrics
// -------------------------------------------------------------------------

/// Body of `POST /api/realtime-metrics`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPayload {
    pub vehicle_id: Option<String>,
    pub route_id: Option<String>,
    /// `[lat, lon]`
    pub current_location: Option<Vec<f64>>,
    /// GPS accuracy in meters
    pub accuracy: Option<f64>,
    pub occupancy: Option<f64>,
    pub occupancy_count: Option<u32>,
    pub delay: Option<f64>,
    pub speed: Option<f64>,
    pub next_stop_id: Option<String>,
    #[serde(rename = "nextStopETA")]
    pub next_stop_eta: Option<f64>,
    pub door_status: Option<DoorStatus>,
    pub engine_status: Option<EngineStatus>,
    pub predicted_arrival_time: Option<DateTime<Utc>>,
    pub predicted_arrival_time_confidence: Option<f64>,
    pub temperature: Option<f64>,
    pub weather_condition: Option<WeatherCondition>,
    pub source: Option<MetricSource>,
    pub data_quality: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidMetric {
    pub vehicle_id: String,
    pub route_id: RouteId,
    pub location: GeoPoint,
    pub accuracy: Option<f64>,
    pub occupancy: f64,
    pub occupancy_count: Option<u32>,
    pub delay: i64,
    pub speed: f64,
    pub next_stop_id: Option<String>,
    pub next_stop_eta: Option<u64>,
    pub door_status: DoorStatus,
    pub engine_status: EngineStatus,
    pub predicted_arrival_time: Option<DateTime<Utc>>,
    pub predicted_arrival_time_confidence: Option<f64>,
    pub temperature: Option<f64>,
    pub weather_condition: WeatherCondition,
    pub source: MetricSource,
    pub data_quality: Option<f64>,
}

pub fn validate_metric(payload: &MetricPayload) -> Result<ValidMetric> {
    let vehicle_id = required_str("vehicleId", payload.vehicle_id.as_deref())?;
    let route_id = required_str("routeId", payload.route_id.as_deref())?;
    let location = match payload.current_location.as_deref() {
        Some(pair) => lat_lon("currentLocation", pair)?,
        None => return Err(Error::validation("currentLocation", "is required")),
    };
    let occupancy = match payload.occupancy {
        Some(o) => in_range("occupancy", o, 0.0, 100.0)?,
        None => return Err(Error::validation("occupancy", "is required")),
    };

    let delay = match payload.delay {
        Some(d) if d.is_finite() => d.round() as i64,
        Some(d) => return Err(Error::validation("delay", format!("invalid value {d}"))),
        None => 0,
    };
    let speed = match payload.speed {
        Some(s) if s.is_finite() && s >= 0.0 => s,
        Some(s) => return Err(Error::validation("speed", format!("invalid value {s}"))),
        None => 0.0,
    };

    Ok(ValidMetric {
        vehicle_id,
        route_id: RouteId(route_id),
        location,
        accuracy: payload.accuracy.map(|a| in_range("accuracy", a, 0.0, f64::MAX)).transpose()?,
        occupancy,
        occupancy_count: payload.occupancy_count,
        delay,
        speed,
        next_stop_id: non_empty(payload.next_stop_id.as_deref()),
        next_stop_eta: seconds("nextStopETA", payload.next_stop_eta)?,
        door_status: payload.door_status.unwrap_or_default(),
        engine_status: payload.engine_status.unwrap_or_default(),
        predicted_arrival_time: payload.predicted_arrival_time,
        predicted_arrival_time_confidence: payload
            .predicted_arrival_time_confidence
            .map(|c| in_range("predictedArrivalTimeConfidence", c, 0.0, 1.0))
            .transpose()?,
        temperature: payload.temperature,
        weather_condition: payload.weather_condition.unwrap_or_default(),
        source: payload.source.unwrap_or_default(),
        data_quality: payload
            .data_quality
            .map(|q| in_range("dataQuality", q, 0.0, 100.0))
            .transpose()?,
    })
}

// -------------------------------------------------------------------------
// Routes
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopPayload {
    pub stop_id: Option<String>,
    pub name: Option<String>,
    /// `[lat, lon]`
    pub coordinates: Option<Vec<f64>>,
    pub sequence_order: Option<u32>,
    pub dwell_time: Option<u32>,
    #[serde(default)]
    pub is_accessible: bool,
}

/// Body of `POST /add-route` and `PUT /route/:id`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePayload {
    pub name: Option<String>,
    pub city: Option<String>,
    pub route_code: Option<String>,
    pub operator: Option<String>,
    /// `[lat, lon]` pairs
    pub gps_coordinates: Option<Vec<Vec<f64>>>,
    pub distance_km: Option<f64>,
    /// Free-form schedule text, e.g. "6:00 - 23:00"
    pub schedule: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub frequency: Option<Frequency>,
    pub days_of_week: Option<Vec<u8>>,
    /// Minutes, as a number or a string with a leading integer ("30min")
    pub time_to_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub stops: Vec<StopPayload>,
    pub capacity: Option<u32>,
    pub vehicle_type: Option<VehicleType>,
    pub accessibility: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidStop {
    pub stop_id: String,
    pub name: String,
    pub coordinates: Option<GeoPoint>,
    pub sequence_order: u32,
    pub dwell_time: Option<u32>,
    pub is_accessible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidRoute {
    pub name: String,
    pub city: String,
    pub route_code: Option<String>,
    pub operator: Option<String>,
    pub gps_coordinates: Vec<[f64; 2]>,
    pub distance_km: Option<f64>,
    pub raw_schedule: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub frequency: Frequency,
    pub days_of_week: Option<Vec<u8>>,
    pub estimated_minutes: Option<u32>,
    pub stops: Vec<ValidStop>,
    pub capacity: Option<u32>,
    pub vehicle_type: VehicleType,
    pub accessibility: bool,
}

/// "HH:MM" with a valid hour and minute
fn time_of_day(field: &'static str, value: Option<&str>) -> Result<Option<String>> {
    let Some(v) = non_empty(value) else {
        return Ok(None);
    };
    let valid = match v.as_bytes() {
        [h1, h2, b':', m1, m2] if [h1, h2, m1, m2].iter().all(|b| b.is_ascii_digit()) => {
            let hours = (h1 - b'0') * 10 + (h2 - b'0');
            let minutes = (m1 - b'0') * 10 + (m2 - b'0');
            hours < 24 && minutes < 60
        }
        _ => false,
    };
    if valid {
        Ok(Some(v))
    } else {
        Err(Error::validation(field, format!("must be HH:MM, got '{v}'")))
    }
}

/// Leading integer of a number or string, like `parseInt`
fn leading_minutes(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| *v >= 0.0).map(|v| v as u32),
        serde_json::Value::String(s) => {
            let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

pub fn validate_route(payload: &RoutePayload) -> Result<ValidRoute> {
    let name = required_str("name", payload.name.as_deref())?;
    let city = required_str("city", payload.city.as_deref())?;

    let raw_coords = payload
        .gps_coordinates
        .as_ref()
        .ok_or_else(|| Error::validation("gpsCoordinates", "is required"))?;
    if raw_coords.len() < 2 {
        return Err(Error::validation("gpsCoordinates", "must contain at least two points"));
    }
    let gps_coordinates = raw_coords
        .iter()
        .map(|pair| lat_lon("gpsCoordinates", pair).map(|p| [p.lat(), p.lon()]))
        .collect::<Result<Vec<_>>>()?;

    let distance_km = match payload.distance_km {
        // A zero distance is treated as absent and derived from the path
        Some(d) if d.is_finite() && d > 0.0 => Some(d),
        Some(d) if d == 0.0 => None,
        Some(d) => return Err(Error::validation("distanceKm", format!("invalid value {d}"))),
        None => None,
    };

    if let Some(days) = &payload.days_of_week {
        if let Some(bad) = days.iter().find(|d| **d > 6) {
            return Err(Error::validation("daysOfWeek", format!("day {bad} out of range 0..=6")));
        }
    }

    let stops = payload
        .stops
        .iter()
        .enumerate()
        .map(|(i, stop)| -> Result<ValidStop> {
            Ok(ValidStop {
                stop_id: required_str("stops.stopId", stop.stop_id.as_deref())?,
                name: required_str("stops.name", stop.name.as_deref())?,
                coordinates: stop
                    .coordinates
                    .as_deref()
                    .map(|p| lat_lon("stops.coordinates", p))
                    .transpose()?,
                sequence_order: stop.sequence_order.unwrap_or(i as u32),
                dwell_time: stop.dwell_time,
                is_accessible: stop.is_accessible,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ValidRoute {
        name,
        city,
        route_code: non_empty(payload.route_code.as_deref()),
        operator: non_empty(payload.operator.as_deref()),
        gps_coordinates,
        distance_km,
        raw_schedule: non_empty(payload.schedule.as_deref()),
        start_time: time_of_day("startTime", payload.start_time.as_deref())?,
        end_time: time_of_day("endTime", payload.end_time.as_deref())?,
        frequency: payload.frequency.unwrap_or_default(),
        days_of_week: payload.days_of_week.clone(),
        estimated_minutes: payload
            .time_to_complete
            .as_ref()
            .and_then(leading_minutes)
            .filter(|m| *m > 0),
        stops,
        capacity: payload.capacity,
        vehicle_type: payload.vehicle_type.unwrap_or_default(),
        accessibility: payload.accessibility.unwrap_or(false),
    })
}
