//! Table layout and the schema version kept in `meta`

use rusqlite::Connection;

pub const SCHEMA_VERSION: i32 = 1;

/// Create all tables and indexes if they do not exist yet
pub fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Route documents; code is the human-readable unique key
        CREATE TABLE IF NOT EXISTS routes (
            id TEXT PRIMARY KEY,
            route_code TEXT NOT NULL UNIQUE,
            city TEXT NOT NULL,
            updated_ms INTEGER NOT NULL,
            doc TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_routes_city ON routes(city);

        -- Route events; scalar columns mirror the fields used for filtering and rollups
        CREATE TABLE IF NOT EXISTS route_events (
            event_id TEXT PRIMARY KEY,
            route_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            action_result TEXT NOT NULL,
            session_duration INTEGER,
            duration_on_route INTEGER,
            timestamp_ms INTEGER NOT NULL,
            doc TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_route_time ON route_events(route_id, timestamp_ms DESC);
        CREATE INDEX IF NOT EXISTS idx_events_user_time ON route_events(user_id, timestamp_ms DESC);
        CREATE INDEX IF NOT EXISTS idx_events_time ON route_events(timestamp_ms);

        -- Vehicle telemetry samples
        CREATE TABLE IF NOT EXISTS realtime_metrics (
            metric_id TEXT PRIMARY KEY,
            vehicle_id TEXT NOT NULL,
            route_id TEXT NOT NULL,
            is_anomaly INTEGER NOT NULL DEFAULT 0,
            timestamp_ms INTEGER NOT NULL,
            doc TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_metrics_route_time ON realtime_metrics(route_id, timestamp_ms DESC);
        CREATE INDEX IF NOT EXISTS idx_metrics_vehicle_time ON realtime_metrics(vehicle_id, timestamp_ms DESC);
        CREATE INDEX IF NOT EXISTS idx_metrics_time ON realtime_metrics(timestamp_ms);
        "#,
    )
}

/// Set a metadata key
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)", [key, value])?;
    Ok(())
}

/// Get a metadata key
pub fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    match conn.query_row("SELECT value FROM meta WHERE key = ?", [key], |row| row.get(0)) {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }

    #[test]
    fn test_meta_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        assert_eq!(get_meta(&conn, "version").unwrap(), None);
        set_meta(&conn, "version", "1").unwrap();
        assert_eq!(get_meta(&conn, "version").unwrap().as_deref(), Some("1"));
    }
}
