//! SQLite document store for routes, events and telemetry
//!
//! Each record is kept as a JSON document next to the scalar columns that
//! queries filter, sort or aggregate on. A single connection is shared behind
//! a mutex; every write is one statement.

pub mod schema;

use crate::domain::{EventTotals, RealTimeMetric, Route, RouteEvent, RouteId};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode};
use schema::SCHEMA_VERSION;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `url`. `":memory:"` opens a private in-memory database.
    pub fn open(url: &str) -> Result<Self> {
        let conn = if url == ":memory:" {
            Connection::open_in_memory()?
        } else {
            let path = Path::new(url);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let conn = Connection::open(path)?;
            // Enable WAL mode for concurrent reads during writes
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
            conn
        };

        schema::create_tables(&conn)?;
        let stored = schema::get_meta(&conn, "version")?.and_then(|v| v.parse::<i32>().ok());
        if let Some(found) = stored.filter(|v| *v > SCHEMA_VERSION) {
            return Err(Error::SchemaVersion { found, supported: SCHEMA_VERSION });
        }
        schema::set_meta(&conn, "version", &SCHEMA_VERSION.to_string())?;

        info!(database_url = %url, schema_version = SCHEMA_VERSION, "store_opened");
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Whether the backend answers a trivial query
    pub fn ping(&self) -> bool {
        self.conn.lock().query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }

    // ---------------------------------------------------------------------
    // Routes
    // ---------------------------------------------------------------------

    pub fn insert_route(&self, route: &Route) -> Result<()> {
        let doc = serde_json::to_string(route)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO routes (id, route_code, city, updated_ms, doc) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                route.id.as_str(),
                route.route_code,
                route.city,
                route.updated_at.timestamp_millis(),
                doc
            ],
        )
        .map_err(|e| unique_violation(e, &route.route_code))?;
        Ok(())
    }

    /// Replace a route document. Returns false when the id is unknown.
    pub fn replace_route(&self, route: &Route) -> Result<bool> {
        let doc = serde_json::to_string(route)?;
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE routes SET route_code = ?2, city = ?3, updated_ms = ?4, doc = ?5 WHERE id = ?1",
                params![
                    route.id.as_str(),
                    route.route_code,
                    route.city,
                    route.updated_at.timestamp_millis(),
                    doc
                ],
            )
            .map_err(|e| unique_violation(e, &route.route_code))?;
        Ok(changed > 0)
    }

    pub fn get_route(&self, id: &RouteId) -> Result<Option<Route>> {
        let doc: Option<String> = {
            let conn = self.conn.lock();
            match conn.query_row("SELECT doc FROM routes WHERE id = ?1", [id.as_str()], |row| {
                row.get(0)
            }) {
                Ok(doc) => Some(doc),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            }
        };
        doc.map(|d| serde_json::from_str(&d).map_err(Error::from)).transpose()
    }

    pub fn list_routes(&self) -> Result<Vec<Route>> {
        let docs = self.query_docs("SELECT doc FROM routes ORDER BY route_code", [])?;
        parse_docs(docs)
    }

    /// Delete a route. Returns false when the id is unknown.
    pub fn delete_route(&self, id: &RouteId) -> Result<bool> {
        let changed = self.conn.lock().execute("DELETE FROM routes WHERE id = ?1", [id.as_str()])?;
        Ok(changed > 0)
    }

    // ---------------------------------------------------------------------
    // Route events
    // ---------------------------------------------------------------------

    pub fn insert_event(&self, event: &RouteEvent) -> Result<()> {
        let doc = serde_json::to_string(event)?;
        let session_duration = seconds_column("sessionDuration", event.session_duration)?;
        let duration_on_route = seconds_column("durationOnRoute", event.duration_on_route)?;
        self.conn.lock().execute(
            "INSERT INTO route_events (event_id, route_id, user_id, session_id, event_type,
                action_result, session_duration, duration_on_route, timestamp_ms, doc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.event_id,
                event.route_id.as_str(),
                event.user_id,
                event.session_id,
                event.event_type.as_str(),
                event.action_result.as_str(),
                session_duration,
                duration_on_route,
                event.timestamp.timestamp_millis(),
                doc
            ],
        )?;
        debug!(event_id = %event.event_id, route_id = %event.route_id, "event_inserted");
        Ok(())
    }

    /// Events for a route at or after `since`, newest first
    pub fn events_since(
        &self,
        route_id: &RouteId,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RouteEvent>> {
        let docs = self.query_docs(
            "SELECT doc FROM route_events
             WHERE route_id = ?1 AND timestamp_ms >= ?2
             ORDER BY timestamp_ms DESC, rowid DESC
             LIMIT ?3",
            params![route_id.as_str(), since.timestamp_millis(), limit as i64],
        )?;
        parse_docs(docs)
    }

    /// Aggregate over every retained event of a route
    pub fn event_totals(&self, route_id: &RouteId) -> Result<EventTotals> {
        let conn = self.conn.lock();
        let totals = conn.query_row(
            "SELECT COUNT(*),
                    COUNT(DISTINCT user_id),
                    COALESCE(SUM(CASE WHEN action_result = 'success' THEN 1 ELSE 0 END), 0),
                    AVG(session_duration),
                    AVG(duration_on_route)
             FROM route_events WHERE route_id = ?1",
            [route_id.as_str()],
            |row| {
                Ok(EventTotals {
                    total: row.get::<_, i64>(0)? as u64,
                    unique_users: row.get::<_, i64>(1)? as u64,
                    success_count: row.get::<_, i64>(2)? as u64,
                    avg_session_duration: row.get(3)?,
                    avg_duration_on_route: row.get(4)?,
                })
            },
        )?;
        Ok(totals)
    }

    /// Delete events older than `cutoff`, returning how many were removed
    pub fn purge_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM route_events WHERE timestamp_ms < ?1", [cutoff.timestamp_millis()])?;
        Ok(removed as u64)
    }

    // ---------------------------------------------------------------------
    // Real-time metrics
    // ---------------------------------------------------------------------

    pub fn insert_metric(&self, metric: &RealTimeMetric) -> Result<()> {
        let doc = serde_json::to_string(metric)?;
        self.conn.lock().execute(
            "INSERT INTO realtime_metrics (metric_id, vehicle_id, route_id, is_anomaly, timestamp_ms, doc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                metric.metric_id,
                metric.vehicle_id,
                metric.route_id.as_str(),
                metric.is_anomaly,
                metric.timestamp.timestamp_millis(),
                doc
            ],
        )?;
        Ok(())
    }

    /// Most recent samples for a route, newest first
    pub fn latest_metrics(&self, route_id: &RouteId, limit: u32) -> Result<Vec<RealTimeMetric>> {
        let docs = self.query_docs(
            "SELECT doc FROM realtime_metrics WHERE route_id = ?1
             ORDER BY timestamp_ms DESC, rowid DESC LIMIT ?2",
            params![route_id.as_str(), limit as i64],
        )?;
        parse_docs(docs)
    }

    pub fn purge_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed = self.conn.lock().execute(
            "DELETE FROM realtime_metrics WHERE timestamp_ms < ?1",
            [cutoff.timestamp_millis()],
        )?;
        Ok(removed as u64)
    }

    fn query_docs<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }
}

fn parse_docs<T: serde::de::DeserializeOwned>(docs: Vec<String>) -> Result<Vec<T>> {
    docs.iter().map(|d| serde_json::from_str(d).map_err(Error::from)).collect()
}

/// SQLite integers are signed; refuse durations that would wrap
fn seconds_column(field: &'static str, value: Option<u64>) -> Result<Option<i64>> {
    value
        .map(|v| {
            i64::try_from(v).map_err(|_| Error::validation(field, format!("{v} exceeds the storable range")))
        })
        .transpose()
}

/// Map a UNIQUE constraint failure on the route code to `Conflict`
fn unique_violation(e: rusqlite::Error, route_code: &str) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            Error::Conflict(format!("route code '{route_code}' already exists"))
        }
        _ => Error::Store(e),
    }
}
