//! Great-circle distance and GeoJSON point helpers

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two lat/lon pairs, in kilometers.
///
/// Out-of-range inputs produce a number, not an error; callers validate.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// GeoJSON point. Coordinates are stored `[lon, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "point_type")]
    kind: PointType,
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
enum PointType {
    #[default]
    Point,
}

fn point_type() -> PointType {
    PointType::Point
}

impl GeoPoint {
    /// Build from the external `[lat, lon]` convention
    #[inline]
    pub fn from_lat_lon(lat: f64, lon: f64) -> Self {
        Self { kind: PointType::Point, coordinates: [lon, lat] }
    }

    #[inline]
    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }

    #[inline]
    pub fn lon(&self) -> f64 {
        self.coordinates[0]
    }

    /// Distance to another point in meters
    pub fn meters_to(&self, other: &GeoPoint) -> f64 {
        distance_km(self.lat(), self.lon(), other.lat(), other.lon()) * 1000.0
    }
}
