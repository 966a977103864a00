//! Route catalog documents

use crate::domain::geo::{distance_km, GeoPoint};
use crate::domain::types::RouteId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_START_TIME: &str = "06:00";
pub const DEFAULT_END_TIME: &str = "23:00";
pub const DEFAULT_ESTIMATED_MINUTES: u32 = 30;
pub const DEFAULT_CAPACITY: u32 = 40;
pub const DEFAULT_OPERATOR: &str = "unspecified";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeospatialData {
    pub start_point: GeoPoint,
    pub end_point: GeoPoint,
    pub distance_km: f64,
}

impl GeospatialData {
    /// Derive endpoints from `[lat, lon]` pairs. `coords` must hold ≥2 points.
    pub fn from_coordinates(coords: &[[f64; 2]], distance_km_override: Option<f64>) -> Self {
        let first = coords[0];
        let last = coords[coords.len() - 1];
        let distance = distance_km_override
            .unwrap_or_else(|| distance_km(first[0], first[1], last[0], last[1]));
        Self {
            start_point: GeoPoint::from_lat_lon(first[0], first[1]),
            end_point: GeoPoint::from_lat_lon(last[0], last[1]),
            distance_km: distance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "5min")]
    Every5Min,
    #[serde(rename = "10min")]
    Every10Min,
    #[default]
    #[serde(rename = "15min")]
    Every15Min,
    #[serde(rename = "30min")]
    Every30Min,
    #[serde(rename = "hourly")]
    Hourly,
    #[serde(rename = "peak")]
    Peak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub raw_string: String,
    /// "HH:MM"
    pub start_time: String,
    /// "HH:MM"
    pub end_time: String,
    pub frequency: Frequency,
    /// 0 = Sunday .. 6 = Saturday
    pub days_of_week: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelTime {
    pub estimated_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub stop_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<GeoPoint>,
    pub sequence_order: u32,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwell_time: Option<u32>,
    #[serde(default)]
    pub is_accessible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    #[default]
    Bus,
    Minibus,
    Metro,
    Van,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Characteristics {
    pub capacity: u32,
    pub vehicle_type: VehicleType,
    pub accessibility: bool,
}

impl Default for Characteristics {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, vehicle_type: VehicleType::Bus, accessibility: false }
    }
}

/// A static transit line definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: RouteId,
    pub route_code: String,
    pub name: String,
    pub city: String,
    pub operator: String,
    /// `[lat, lon]` pairs, at least two
    pub gps_coordinates: Vec<[f64; 2]>,
    pub geospatial_data: GeospatialData,
    pub schedule: Schedule,
    pub travel_time: TravelTime,
    #[serde(default)]
    pub stops: Vec<Stop>,
    pub characteristics: Characteristics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Generate a route code: city prefix plus the last four digits of `epoch_ms`
pub fn generate_route_code(city: &str, epoch_ms: i64) -> String {
    let prefix: String = city.chars().take(3).collect::<String>().to_uppercase();
    let digits = epoch_ms.rem_euclid(10_000);
    format!("{prefix}-{digits:04}")
}
