//! HTTP client for the transit analytics API
//!
//! Used by the offline tracker and the feed simulator. One `reqwest::Client`
//! is built per `ApiClient` and reused for connection pooling.

use crate::domain::event::RouteEvent;
use crate::domain::metric::RealTimeMetric;
use crate::domain::route::Route;
use crate::domain::stats::RouteStats;
use crate::domain::types::RouteId;
use crate::error::{Error, Result};
use crate::io::http::SESSION_HEADER;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server acknowledgment for a stored event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAck {
    pub message: String,
    pub event_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricAck {
    pub message: String,
    pub metric_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAck {
    pub message: String,
    pub route_id: RouteId,
    pub route_code: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).http1_only().build()?;
        Ok(Self { http, base: base.trim_end_matches('/').to_string() })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Map non-2xx statuses onto the shared error type
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        Err(match status.as_u16() {
            404 => Error::NotFound(message),
            409 => Error::Conflict(message),
            // timeouts and rate limits are worth retrying
            code @ (400..=499) if !matches!(code, 408 | 429) => Error::Rejected { status: code, message },
            code => Error::Network(format!("HTTP {code}: {message}")),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.http.get(self.url(path)).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        session_id: Option<&str>,
    ) -> Result<T> {
        let mut req = self.http.post(self.url(path)).json(body);
        if let Some(id) = session_id {
            req = req.header(SESSION_HEADER, id);
        }
        let resp = req.send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn post_event<B: Serialize + ?Sized>(
        &self,
        event: &B,
        session_id: Option<&str>,
    ) -> Result<EventAck> {
        self.post_json("/api/events", event, session_id).await
    }

    pub async fn fetch_events(&self, route_id: &RouteId, days: u32, limit: u32) -> Result<Vec<RouteEvent>> {
        self.get_json(&format!("/api/events/{route_id}?days={days}&limit={limit}")).await
    }

    pub async fn fetch_stats(&self, route_id: &RouteId) -> Result<RouteStats> {
        self.get_json(&format!("/api/events-stats/{route_id}")).await
    }

    pub async fn post_metric<B: Serialize + ?Sized>(&self, metric: &B) -> Result<MetricAck> {
        self.post_json("/api/realtime-metrics", metric, None).await
    }

    pub async fn latest_metrics(&self, route_id: &RouteId) -> Result<Vec<RealTimeMetric>> {
        self.get_json(&format!("/api/realtime-metrics/latest/{route_id}")).await
    }

    pub async fn list_routes(&self) -> Result<Vec<Route>> {
        self.get_json("/routes").await
    }

    pub async fn add_route<B: Serialize + ?Sized>(&self, route: &B) -> Result<RouteAck> {
        self.post_json("/add-route", route, None).await
    }

    pub async fn health(&self) -> Result<serde_json::Value> {
        self.get_json("/health").await
    }
}
