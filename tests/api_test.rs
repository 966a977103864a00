//! End-to-end tests against the HTTP API on an ephemeral port

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use transit_analytics::domain::geo::distance_km;
use transit_analytics::infra::{Metrics, Store, SystemClock};
use transit_analytics::io::{serve, AppState};

struct TestServer {
    base: String,
    client: reqwest::Client,
    _shutdown: watch::Sender<bool>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState::new(Store::in_memory().unwrap(), Arc::new(SystemClock), Arc::new(Metrics::new()));
        let (tx, rx) = watch::channel(false);
        tokio::spawn(serve(listener, state, rx));
        Self { base: format!("http://{addr}"), client: reqwest::Client::new(), _shutdown: tx }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn add_route(&self, code: &str) -> String {
        let (status, body) = self
            .post(
                "/add-route",
                json!({
                    "name": "Centro - Norte",
                    "city": "Celaya",
                    "routeCode": code,
                    "gpsCoordinates": [[20.52, -100.81], [20.53, -100.82], [20.55, -100.84]],
                    "timeToComplete": "45 min"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["routeId"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_route_lifecycle() {
    let server = TestServer::start().await;
    let id = server.add_route("CEL-100").await;

    let (status, route) = server.get(&format!("/route/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(route["routeCode"], "CEL-100");
    assert_eq!(route["travelTime"]["estimatedMinutes"], 45);
    assert_eq!(route["schedule"]["startTime"], "06:00");
    let expected = distance_km(20.52, -100.81, 20.55, -100.84);
    let distance = route["geospatialData"]["distanceKm"].as_f64().unwrap();
    assert!((distance - expected).abs() < 1e-9);
    // stored GeoJSON points are [lon, lat]
    assert_eq!(route["geospatialData"]["startPoint"]["coordinates"], json!([-100.81, 20.52]));

    let (_, routes) = server.get("/routes").await;
    assert_eq!(routes.as_array().unwrap().len(), 1);

    let resp = server
        .client
        .put(server.url(&format!("/route/{id}")))
        .json(&json!({
            "name": "Centro - Sur",
            "city": "Celaya",
            "gpsCoordinates": [[20.52, -100.81], [20.50, -100.80]]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["name"], "Centro - Sur");
    assert_eq!(updated["routeCode"], "CEL-100");

    let resp = server.client.delete(server.url(&format!("/route/{id}"))).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let (status, body) = server.get(&format!("/route/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_route_errors() {
    let server = TestServer::start().await;
    server.add_route("CEL-200").await;

    let (status, _) = server
        .post(
            "/add-route",
            json!({
                "name": "Otra",
                "city": "Celaya",
                "routeCode": "CEL-200",
                "gpsCoordinates": [[20.52, -100.81], [20.55, -100.84]]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = server
        .post("/add-route", json!({ "name": "Sin ciudad", "gpsCoordinates": [[1.0, 2.0], [3.0, 4.0]] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "city");

    let resp = server.client.delete(server.url("/route/missing")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_recording_and_stats() {
    let server = TestServer::start().await;
    let route_id = server.add_route("CEL-300").await;

    for i in 0..10 {
        let result = if i < 7 { "success" } else { "abandoned" };
        let (status, body) = server
            .post(
                "/api/events",
                json!({
                    "eventType": "view",
                    "routeId": route_id,
                    "actionResult": result,
                    "sessionDuration": 10 + i,
                    "userLocation": [20.52, -100.81]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert!(body["eventId"].is_string());
    }

    let (status, stats) = server.get(&format!("/api/events-stats/{route_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalEvents"], 10);
    assert_eq!(stats["uniqueUsers"], 1);
    assert_eq!(stats["successRate"], 70.0);
    // mean of 10..=19
    assert_eq!(stats["avgSessionDuration"], 15);
    assert_eq!(stats["avgDurationOnRoute"], 0);

    let (status, events) = server.get(&format!("/api/events/{route_id}?limit=3")).await;
    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["routeCode"], "CEL-300");
    assert_eq!(events[0]["proximityToRoute"], 0.0);
    let ts = |e: &Value| e["timestamp"].as_str().unwrap().parse::<DateTime<Utc>>().unwrap();
    assert!(ts(&events[0]) >= ts(&events[1]));
}

#[tokio::test]
async fn test_stats_for_unknown_route_are_zero() {
    let server = TestServer::start().await;
    let (status, stats) = server.get("/api/events-stats/nothing-here").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        stats,
        json!({
            "totalEvents": 0,
            "uniqueUsers": 0,
            "successRate": 0.0,
            "avgSessionDuration": 0,
            "avgDurationOnRoute": 0
        })
    );
}

#[tokio::test]
async fn test_invalid_event_is_rejected() {
    let server = TestServer::start().await;

    let (status, body) = server.post("/api/events", json!({ "eventType": "view" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "routeId");

    let (status, body) = server.post("/api/events", json!({ "eventType": "teleport", "routeId": "r1" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "eventType");

    let resp = server
        .client
        .post(server.url("/api/events"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let (_, events) = server.get("/api/events/r1").await;
    assert_eq!(events, json!([]));

    let (status, _) = server.get("/api/events/r1?days=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server
        .post("/api/events", json!({ "eventType": "view", "routeId": "r1", "sessionDuration": 1e19 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "sessionDuration");
}

#[tokio::test]
async fn test_widest_query_window_is_served() {
    let server = TestServer::start().await;
    let (status, _) = server.post("/api/events", json!({ "eventType": "view", "routeId": "r1" })).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, events) = server.get("/api/events/r1?days=4294967295").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.as_array().unwrap().len(), 1);

    // the server is still up
    let (status, _) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_session_header_is_recorded() {
    let server = TestServer::start().await;
    let resp = server
        .client
        .post(server.url("/api/events"))
        .header("x-session-id", "session-abc")
        .json(&json!({ "eventType": "click", "routeId": "r9" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let (_, events) = server.get("/api/events/r9").await;
    assert_eq!(events[0]["sessionId"], "session-abc");
    assert_eq!(events[0]["userId"].as_str().unwrap().len(), 64);
    assert!(events[0].get("routeCode").is_none());
}

#[tokio::test]
async fn test_realtime_metrics() {
    let server = TestServer::start().await;
    let route_id = server.add_route("CEL-400").await;

    for delay in [300, 301, 1000] {
        let (status, body) = server
            .post(
                "/api/realtime-metrics",
                json!({
                    "vehicleId": "BUS-7",
                    "routeId": route_id,
                    "currentLocation": [20.53, -100.82],
                    "occupancy": 55,
                    "delay": delay
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert!(body["metricId"].is_string());
    }

    let (status, latest) = server.get(&format!("/api/realtime-metrics/latest/{route_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let latest = latest.as_array().unwrap();
    assert_eq!(latest.len(), 3);
    let by_delay = |d: i64| latest.iter().find(|m| m["delay"] == d).unwrap();
    assert_eq!(by_delay(300)["onTimePerformance"], true);
    assert_eq!(by_delay(301)["onTimePerformance"], false);
    assert_eq!(by_delay(1000)["isAnomaly"], true);
    assert_eq!(by_delay(300)["routeCode"], "CEL-400");

    let (status, body) = server
        .post(
            "/api/realtime-metrics",
            json!({ "vehicleId": "BUS-7", "routeId": route_id, "currentLocation": [20.53, -100.82] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "occupancy");

    let (status, _) = server
        .post(
            "/api/realtime-metrics",
            json!({ "vehicleId": "BUS-7", "routeId": route_id, "currentLocation": [20.53, -100.82], "occupancy": 120 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_latest_metrics_capped_at_ten() {
    let server = TestServer::start().await;
    for _ in 0..12 {
        let (status, _) = server
            .post(
                "/api/realtime-metrics",
                json!({ "vehicleId": "BUS-1", "routeId": "r1", "currentLocation": [20.5, -100.8], "occupancy": 10 }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (_, latest) = server.get("/api/realtime-metrics/latest/r1").await;
    assert_eq!(latest.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_health_cors_and_metrics() {
    let server = TestServer::start().await;

    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    let health: Value = resp.json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["database"], "connected");
    assert!(health["version"].as_str().unwrap().starts_with(env!("CARGO_PKG_VERSION")));

    let resp = server
        .client
        .request(reqwest::Method::OPTIONS, server.url("/api/events"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(resp.headers().contains_key("access-control-allow-methods"));

    let (status, body) = server.get("/no/such/path").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let text = server.client.get(server.url("/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(text.contains("# TYPE transit_http_requests_total counter"));
    assert!(text.contains("transit_http_request_latency_us_bucket{le=\"+Inf\"}"));
}
