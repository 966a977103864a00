//! Route catalog - create, update, read and delete route documents

use crate::domain::identity::new_uuid_v7;
use crate::domain::route::{
    generate_route_code, Characteristics, GeospatialData, Route, Schedule, Stop, TravelTime,
    DEFAULT_CAPACITY, DEFAULT_END_TIME, DEFAULT_ESTIMATED_MINUTES, DEFAULT_OPERATOR,
    DEFAULT_START_TIME,
};
use crate::domain::types::RouteId;
use crate::error::{Error, Result};
use crate::infra::{Clock, Store};
use crate::services::validation::{validate_route, RoutePayload, ValidRoute};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct RouteCatalog {
    store: Store,
    clock: Arc<dyn Clock>,
}

impl RouteCatalog {
    pub fn new(store: Store, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn create(&self, payload: &RoutePayload) -> Result<Route> {
        let valid = validate_route(payload)?;
        let now = self.clock.now();
        let code = valid
            .route_code
            .clone()
            .unwrap_or_else(|| generate_route_code(&valid.city, now.timestamp_millis()));

        let route = build_route(RouteId(new_uuid_v7()), code, valid, now, now);
        self.store.insert_route(&route)?;

        info!(
            route_id = %route.id,
            route_code = %route.route_code,
            distance_km = %format!("{:.3}", route.geospatial_data.distance_km),
            "route_created"
        );
        Ok(route)
    }

    /// Replace a route's definition, keeping its id, creation time and (unless
    /// a new one is supplied) its code
    pub fn update(&self, id: &RouteId, payload: &RoutePayload) -> Result<Route> {
        let valid = validate_route(payload)?;
        let existing = self.get(id)?;
        let code = valid.route_code.clone().unwrap_or_else(|| existing.route_code.clone());

        let route = build_route(existing.id, code, valid, existing.created_at, self.clock.now());
        if !self.store.replace_route(&route)? {
            return Err(Error::NotFound(format!("route {id}")));
        }

        info!(route_id = %route.id, route_code = %route.route_code, "route_updated");
        Ok(route)
    }

    pub fn get(&self, id: &RouteId) -> Result<Route> {
        self.store.get_route(id)?.ok_or_else(|| Error::NotFound(format!("route {id}")))
    }

    pub fn list(&self) -> Result<Vec<Route>> {
        self.store.list_routes()
    }

    pub fn delete(&self, id: &RouteId) -> Result<()> {
        if !self.store.delete_route(id)? {
            return Err(Error::NotFound(format!("route {id}")));
        }
        info!(route_id = %id, "route_deleted");
        Ok(())
    }
}

fn build_route(
    id: RouteId,
    route_code: String,
    valid: ValidRoute,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> Route {
    let geospatial_data = GeospatialData::from_coordinates(&valid.gps_coordinates, valid.distance_km);
    let start_time = valid.start_time.unwrap_or_else(|| DEFAULT_START_TIME.to_string());
    let end_time = valid.end_time.unwrap_or_else(|| DEFAULT_END_TIME.to_string());

    Route {
        id,
        route_code,
        name: valid.name,
        city: valid.city,
        operator: valid.operator.unwrap_or_else(|| DEFAULT_OPERATOR.to_string()),
        gps_coordinates: valid.gps_coordinates,
        geospatial_data,
        schedule: Schedule {
            raw_string: valid.raw_schedule.unwrap_or_else(|| format!("{start_time} - {end_time}")),
            start_time,
            end_time,
            frequency: valid.frequency,
            days_of_week: valid.days_of_week.unwrap_or_else(|| (0..=6).collect()),
        },
        travel_time: TravelTime {
            estimated_minutes: valid.estimated_minutes.unwrap_or(DEFAULT_ESTIMATED_MINUTES),
        },
        stops: valid
            .stops
            .into_iter()
            .map(|s| Stop {
                stop_id: s.stop_id,
                name: s.name,
                coordinates: s.coordinates,
                sequence_order: s.sequence_order,
                dwell_time: s.dwell_time,
                is_accessible: s.is_accessible,
            })
            .collect(),
        characteristics: Characteristics {
            capacity: valid.capacity.unwrap_or(DEFAULT_CAPACITY),
            vehicle_type: valid.vehicle_type,
            accessibility: valid.accessibility,
        },
        created_at,
        updated_at,
    }
}
