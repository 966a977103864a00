//! Event store - records and queries route interaction events

use crate::domain::event::{RouteEvent, TemporalContext};
use crate::domain::identity::new_uuid_v7;
use crate::domain::route::Route;
use crate::domain::types::RouteId;
use crate::error::Result;
use crate::infra::{Clock, Metrics, Store};
use crate::services::validation::{validate_event, EventPayload, EventQuery};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Caller identity resolved by the HTTP layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Pseudonymous hash of IP + user agent
    pub user_id: String,
    pub session_id: String,
}

#[derive(Clone)]
pub struct EventStore {
    store: Store,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl EventStore {
    pub fn new(store: Store, clock: Arc<dyn Clock>, metrics: Arc<Metrics>) -> Self {
        Self { store, clock, metrics }
    }

    /// Validate and persist one event. Returns the generated event id.
    ///
    /// Route metadata is best-effort: an unknown route or a failed lookup
    /// leaves `routeCode` and `proximityToRoute` empty.
    pub fn record_event(&self, payload: &EventPayload, ctx: &RequestContext) -> Result<String> {
        let valid = validate_event(payload).inspect_err(|_| self.metrics.record_validation_failure())?;

        let route = resolve_route(&self.store, &self.metrics, &valid.route_id);
        let proximity_to_route = match (&valid.user_location, &route) {
            (Some(location), Some(route)) => {
                Some(location.meters_to(&route.geospatial_data.start_point))
            }
            _ => None,
        };

        let timestamp = self.clock.now();
        let event = RouteEvent {
            event_id: new_uuid_v7(),
            event_type: valid.event_type,
            user_id: ctx.user_id.clone(),
            session_id: ctx.session_id.clone(),
            user_location: valid.user_location,
            proximity_to_route,
            route_code: route.map(|r| r.route_code),
            route_id: valid.route_id,
            timestamp,
            temporal: TemporalContext::from_timestamp(timestamp),
            session_duration: valid.session_duration,
            duration_on_route: valid.duration_on_route,
            device_info: valid.device_info,
            action_result: valid.action_result,
            search_query: valid.search_query,
        };

        self.store.insert_event(&event).inspect_err(|_| self.metrics.record_store_error())?;
        self.metrics.record_event();

        info!(
            event_id = %event.event_id,
            event_type = %event.event_type.as_str(),
            route_id = %event.route_id,
            action_result = %event.action_result.as_str(),
            "event_recorded"
        );
        Ok(event.event_id)
    }

    /// Events for a route within the trailing `query.days`, newest first.
    /// A window reaching past the representable range covers everything.
    pub fn query_events(&self, route_id: &RouteId, query: EventQuery) -> Result<Vec<RouteEvent>> {
        let since = self
            .clock
            .now()
            .checked_sub_signed(Duration::days(i64::from(query.days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.store
            .events_since(route_id, since, query.limit)
            .inspect_err(|_| self.metrics.record_store_error())
    }
}

/// Best-effort route lookup shared by the event and metric stores
pub(crate) fn resolve_route(store: &Store, metrics: &Metrics, route_id: &RouteId) -> Option<Route> {
    match store.get_route(route_id) {
        Ok(Some(route)) => Some(route),
        Ok(None) => {
            warn!(route_id = %route_id, "route_metadata_unavailable");
            None
        }
        Err(e) => {
            metrics.record_route_lookup_failure();
            warn!(route_id = %route_id, error = %e, "route_lookup_failed");
            None
        }
    }
}
