//! HTTP API server
//!
//! Manual method/path routing on hyper's http1 server. Every response is
//! JSON except `/metrics`, and every response carries a permissive CORS
//! origin header. Errors map to `{"error": ..}` with a `"field"` for
//! validation failures.

use crate::domain::identity::{derive_user_id, new_session_id};
use crate::domain::types::RouteId;
use crate::error::{Error, Result};
use crate::infra::{Clock, Metrics, Store};
use crate::io::prometheus::{self, format_prometheus_metrics};
use crate::services::validation::{parse_event_query, EventPayload, MetricPayload, RoutePayload};
use crate::services::{Aggregator, EventStore, MetricStore, RequestContext, RouteCatalog};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub const SESSION_HEADER: &str = "x-session-id";

/// Package version plus the build's git hash
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("GIT_HASH"));

type HttpResponse = Response<Full<Bytes>>;

/// Services shared by every connection
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<Metrics>,
    pub catalog: RouteCatalog,
    pub events: EventStore,
    pub samples: MetricStore,
    pub aggregator: Aggregator,
}

impl AppState {
    pub fn new(store: Store, clock: Arc<dyn Clock>, metrics: Arc<Metrics>) -> Self {
        Self {
            catalog: RouteCatalog::new(store.clone(), clock.clone()),
            events: EventStore::new(store.clone(), clock.clone(), metrics.clone()),
            samples: MetricStore::new(store.clone(), clock.clone(), metrics.clone()),
            aggregator: Aggregator::new(store.clone(), metrics.clone()),
            store,
            clock,
            metrics,
        }
    }
}

// -------------------------------------------------------------------------
// Response helpers
// -------------------------------------------------------------------------

fn response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut resp = Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Result<HttpResponse> {
    Ok(response(status, "application/json", serde_json::to_vec(body)?))
}

fn error_response(e: &Error) -> HttpResponse {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match e {
        Error::Validation { field, .. } => json!({ "error": e.to_string(), "field": field }),
        _ if e.is_client_facing() => json!({ "error": e.to_string() }),
        _ => json!({ "error": "internal server error" }),
    };
    response(status, "application/json", body.to_string())
}

fn with_cors(mut resp: HttpResponse) -> HttpResponse {
    resp.headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    resp
}

fn preflight() -> HttpResponse {
    let mut resp = response(StatusCode::NO_CONTENT, "text/plain", Bytes::new());
    let headers = resp.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, X-Session-Id"),
    );
    resp
}

// -------------------------------------------------------------------------
// Request helpers
// -------------------------------------------------------------------------

async fn read_json<T: DeserializeOwned>(body: Incoming) -> Result<T> {
    let bytes = Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| Error::validation("body", format!("unreadable request body: {e}")))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| Error::validation("body", format!("invalid JSON: {e}")))
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

/// Resolve caller identity from the peer address and request headers
fn request_context(headers: &HeaderMap, peer: SocketAddr) -> RequestContext {
    let ip = peer.ip().to_string();
    RequestContext {
        user_id: derive_user_id(Some(&ip), header_str(headers, header::USER_AGENT)),
        session_id: header_str(headers, SESSION_HEADER).map_or_else(new_session_id, str::to_string),
    }
}

// -------------------------------------------------------------------------
// Routing
// -------------------------------------------------------------------------

/// Run synchronous store work on the blocking pool
async fn blocking<T, F>(state: &Arc<AppState>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

async fn dispatch(req: Request<Incoming>, peer: SocketAddr, state: &Arc<AppState>) -> Result<HttpResponse> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (&parts.method, segments.as_slice()) {
        (&Method::OPTIONS, _) => Ok(preflight()),

        (&Method::POST, ["api", "events"]) => {
            let payload: EventPayload = read_json(body).await?;
            let ctx = request_context(&parts.headers, peer);
            let event_id = blocking(state, move |s| s.events.record_event(&payload, &ctx)).await?;
            json_response(
                StatusCode::CREATED,
                &json!({ "message": "Event recorded", "eventId": event_id }),
            )
        }
        (&Method::GET, ["api", "events", route_id]) => {
            let query = parse_event_query(parts.uri.query())?;
            let route_id = RouteId::from(*route_id);
            let events = blocking(state, move |s| s.events.query_events(&route_id, query)).await?;
            json_response(StatusCode::OK, &events)
        }
        (&Method::GET, ["api", "events-stats", route_id]) => {
            let route_id = RouteId::from(*route_id);
            let stats = blocking(state, move |s| s.aggregator.compute_stats(&route_id)).await?;
            json_response(StatusCode::OK, &stats)
        }

        (&Method::POST, ["api", "realtime-metrics"]) => {
            let payload: MetricPayload = read_json(body).await?;
            let metric_id = blocking(state, move |s| s.samples.record_metric(&payload)).await?;
            json_response(
                StatusCode::CREATED,
                &json!({ "message": "Metric recorded", "metricId": metric_id }),
            )
        }
        (&Method::GET, ["api", "realtime-metrics", "latest", route_id]) => {
            let route_id = RouteId::from(*route_id);
            let latest = blocking(state, move |s| s.samples.latest_metrics(&route_id)).await?;
            json_response(StatusCode::OK, &latest)
        }

        (&Method::GET, ["routes"]) => {
            let routes = blocking(state, |s| s.catalog.list()).await?;
            json_response(StatusCode::OK, &routes)
        }
        (&Method::GET, ["route", id]) => {
            let id = RouteId::from(*id);
            let route = blocking(state, move |s| s.catalog.get(&id)).await?;
            json_response(StatusCode::OK, &route)
        }
        (&Method::POST, ["add-route"]) => {
            let payload: RoutePayload = read_json(body).await?;
            let route = blocking(state, move |s| s.catalog.create(&payload)).await?;
            json_response(
                StatusCode::CREATED,
                &json!({
                    "message": "Route added",
                    "routeId": route.id,
                    "routeCode": route.route_code,
                }),
            )
        }
        (&Method::PUT, ["route", id]) => {
            let payload: RoutePayload = read_json(body).await?;
            let id = RouteId::from(*id);
            let route = blocking(state, move |s| s.catalog.update(&id, &payload)).await?;
            json_response(StatusCode::OK, &route)
        }
        (&Method::DELETE, ["route", id]) => {
            let id = RouteId::from(*id);
            blocking(state, move |s| s.catalog.delete(&id)).await?;
            json_response(StatusCode::OK, &json!({ "message": "Route deleted" }))
        }

        (&Method::GET, ["health"]) => {
            let connected = blocking(state, |s| Ok(s.store.ping())).await?;
            json_response(
                StatusCode::OK,
                &json!({
                    "status": if connected { "ok" } else { "degraded" },
                    "database": if connected { "connected" } else { "disconnected" },
                    "version": VERSION,
                    "timestamp": state.clock.now(),
                }),
            )
        }
        (&Method::GET, ["metrics"]) => Ok(response(
            StatusCode::OK,
            prometheus::CONTENT_TYPE,
            format_prometheus_metrics(&state.metrics.snapshot()),
        )),

        _ => Err(Error::NotFound(format!("{} {path}", parts.method))),
    }
}

async fn handle_request(
    req: Request<Incoming>,
    peer: SocketAddr,
    state: Arc<AppState>,
) -> std::result::Result<HttpResponse, Infallible> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let resp = match dispatch(req, peer, &state).await {
        Ok(resp) => resp,
        Err(e) => {
            if e.is_client_facing() {
                warn!(method = %method, path = %path, error = %e, "request_rejected");
            } else {
                error!(method = %method, path = %path, error = %e, "request_failed");
            }
            error_response(&e)
        }
    };

    let latency_us = started.elapsed().as_micros() as u64;
    state.metrics.record_request(latency_us);
    debug!(
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        latency_us = latency_us,
        "http_request"
    );
    Ok(with_cors(resp))
}

/// Serve the API on an already-bound listener until shutdown
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let state = Arc::new(state);
    let addr = listener.local_addr()?;
    info!(addr = %addr, version = VERSION, "api_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, peer, state).await }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                debug!(peer = %peer, error = %e, "api_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("api_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind `addr` and serve the API
pub async fn start_api_server(
    addr: SocketAddr,
    state: AppState,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown).await
}
