//! Client-side event tracker with offline buffering
//!
//! Delivers route interaction events to the API. When the client is offline,
//! or delivery fails or times out, the event is appended to a persistent
//! local queue and retried by `sync_pending`, which runs on an interval and
//! whenever connectivity comes back. Delivered records stay in the queue
//! flagged `synced` until `clear_synced` compacts them.
//!
//! Connectivity is a `watch` channel owned by the embedding application;
//! delivery goes through an `EventSink` so tests can substitute the network.
//! Events the server refuses outright are dead-lettered rather than retried.

pub mod device;
pub mod queue;

#[cfg(test)]
mod tests;

use crate::domain::event::{ActionResult, DeviceInfo, EventType};
use crate::domain::identity::{new_session_id, new_uuid_v7};
use crate::domain::types::RouteId;
use crate::error::{Error, Result};
use crate::infra::{Clock, Config};
use crate::io::api_client::{ApiClient, EventAck};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use device::device_info_from_user_agent;
pub use queue::{PendingQueue, PendingRecord};

/// Per-attempt delivery timeout
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where events go when online
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, session_id: &str, event: &OutgoingEvent) -> Result<EventAck>;
}

#[async_trait]
impl EventSink for ApiClient {
    async fn deliver(&self, session_id: &str, event: &OutgoingEvent) -> Result<EventAck> {
        self.post_event(event, Some(session_id)).await
    }
}

/// Event body as sent to `POST /api/events`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingEvent {
    pub event_type: EventType,
    pub route_id: RouteId,
    pub session_duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    pub action_result: ActionResult,
    /// `[lat, lon]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_location: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_on_route: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_count: Option<u32>,
}

/// Caller-supplied fields; set values override the tracker's defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackOptions {
    pub user_location: Option<[f64; 2]>,
    pub duration_on_route: Option<u64>,
    pub action_result: Option<ActionResult>,
    pub search_query: Option<String>,
    pub result_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Delivered(EventAck),
    /// Buffered locally under this record id
    Queued(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub session_id: String,
    pub duration: u64,
    pub start_time: DateTime<Utc>,
    pub is_online: bool,
    pub device_info: Option<DeviceInfo>,
    pub pending_events: usize,
}

/// Clears the in-flight flag when a sync pass ends, however it ends
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct EventTracker {
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    online: watch::Receiver<bool>,
    queue: PendingQueue,
    timeout: Duration,
    session_id: String,
    session_start: DateTime<Utc>,
    device_info: Option<DeviceInfo>,
    route_view_start: Mutex<Option<DateTime<Utc>>>,
    sync_running: AtomicBool,
}

impl EventTracker {
    pub fn new(
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        online: watch::Receiver<bool>,
        queue: PendingQueue,
    ) -> Self {
        let session_start = clock.now();
        Self {
            sink,
            clock,
            online,
            queue,
            timeout: DEFAULT_DELIVERY_TIMEOUT,
            session_id: new_session_id(),
            session_start,
            device_info: None,
            route_view_start: Mutex::new(None),
            sync_running: AtomicBool::new(false),
        }
    }

    /// Tracker posting to `[tracker].api_base`, buffering into `[tracker].queue_file`
    pub async fn from_config(
        config: &Config,
        clock: Arc<dyn Clock>,
        online: watch::Receiver<bool>,
    ) -> Result<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms());
        let client = ApiClient::new(config.api_base(), timeout)?;
        let queue = PendingQueue::open(config.queue_file()).await?;
        info!(
            api = %client.base(),
            queue_file = %config.queue_file(),
            pending = queue.pending_count().await,
            "event_tracker_ready"
        );
        Ok(Self::new(Arc::new(client), clock, online, queue).with_timeout(timeout))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_device_info(mut self, device_info: DeviceInfo) -> Self {
        self.device_info = Some(device_info);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    fn session_duration(&self) -> u64 {
        (self.clock.now() - self.session_start).num_seconds().max(0) as u64
    }

    fn build_event(&self, event_type: EventType, route_id: &RouteId, options: TrackOptions) -> OutgoingEvent {
        OutgoingEvent {
            event_type,
            route_id: route_id.clone(),
            session_duration: self.session_duration(),
            device_info: self.device_info.clone(),
            action_result: options.action_result.unwrap_or_default(),
            user_location: options.user_location,
            duration_on_route: options.duration_on_route,
            search_query: options.search_query,
            result_count: options.result_count,
        }
    }

    async fn try_deliver(&self, session_id: &str, event: &OutgoingEvent) -> Result<EventAck> {
        match tokio::time::timeout(self.timeout, self.sink.deliver(session_id, event)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Network(format!(
                "delivery timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    /// Deliver one event, or buffer it locally when that is not possible
    pub async fn track(
        &self,
        event_type: EventType,
        route_id: &RouteId,
        options: TrackOptions,
    ) -> Result<TrackOutcome> {
        let event = self.build_event(event_type, route_id, options);

        if self.is_online() {
            match self.try_deliver(&self.session_id, &event).await {
                Ok(ack) => {
                    debug!(event_id = %ack.event_id, event_type = %event_type.as_str(), "event_delivered");
                    return Ok(TrackOutcome::Delivered(ack));
                }
                Err(e @ Error::Rejected { .. }) => {
                    warn!(event_type = %event_type.as_str(), route_id = %route_id, error = %e, "event_rejected");
                    return Err(e);
                }
                Err(e) => {
                    warn!(event_type = %event_type.as_str(), route_id = %route_id, error = %e, "event_delivery_failed");
                }
            }
        } else {
            debug!(event_type = %event_type.as_str(), "event_buffered_offline");
        }

        self.enqueue_locally(event).await.map(TrackOutcome::Queued)
    }

    /// Append an event to the persistent queue. Returns the record id.
    pub async fn enqueue_locally(&self, event: OutgoingEvent) -> Result<String> {
        let record = PendingRecord {
            id: new_uuid_v7(),
            session_id: self.session_id.clone(),
            event,
            captured_at: self.clock.now(),
            synced: false,
            rejected: None,
        };
        let id = record.id.clone();
        self.queue.push(record).await?;
        Ok(id)
    }

    /// Retry every unsynced record once.
    ///
    /// Returns `None` without doing anything when offline or when another
    /// pass is already running. Records are delivered independently, so
    /// arrival order at the server is not guaranteed.
    pub async fn sync_pending(&self) -> Result<Option<SyncReport>> {
        if !self.is_online() {
            return Ok(None);
        }
        if self
            .sync_running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!("sync_pass_already_running");
            return Ok(None);
        }
        let _guard = SyncGuard(&self.sync_running);

        let pending = self.queue.unsynced().await;
        let mut report = SyncReport { attempted: pending.len(), ..Default::default() };
        if pending.is_empty() {
            return Ok(Some(report));
        }

        let mut delivered = Vec::with_capacity(pending.len());
        let mut rejected = Vec::new();
        for record in &pending {
            match self.try_deliver(&record.session_id, &record.event).await {
                Ok(_) => delivered.push(record.id.clone()),
                Err(e @ Error::Rejected { .. }) => {
                    warn!(record_id = %record.id, error = %e, "pending_event_rejected");
                    rejected.push((record.id.clone(), e.to_string()));
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(record_id = %record.id, error = %e, "pending_event_sync_failed");
                }
            }
        }
        report.delivered = delivered.len();
        report.rejected = rejected.len();
        self.queue.mark_synced(&delivered).await?;
        if !rejected.is_empty() {
            self.queue.mark_rejected(&rejected).await?;
        }

        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            rejected = report.rejected,
            "pending_events_synced"
        );
        Ok(Some(report))
    }

    /// Sync on every tick and on each offline-to-online transition until shutdown
    pub async fn run_sync_loop(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        let mut connectivity = self.online.clone();
        let mut watching = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_pending().await {
                        warn!(error = %e, "sync_pass_failed");
                    }
                }
                changed = connectivity.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    let online = *connectivity.borrow_and_update();
                    if online {
                        info!("connectivity_restored");
                        if let Err(e) = self.sync_pending().await {
                            warn!(error = %e, "sync_pass_failed");
                        }
                    } else {
                        info!("connectivity_lost");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("tracker_sync_loop_shutdown");
                        break;
                    }
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Convenience trackers
    // ---------------------------------------------------------------------

    pub async fn track_route_view(&self, route_id: &RouteId, user_location: Option<[f64; 2]>) -> Result<TrackOutcome> {
        *self.route_view_start.lock() = Some(self.clock.now());
        let options = TrackOptions { user_location, duration_on_route: Some(0), ..Default::default() };
        self.track(EventType::View, route_id, options).await
    }

    /// Selection after a view; `durationOnRoute` is the time since that view
    pub async fn track_route_select(&self, route_id: &RouteId, user_location: Option<[f64; 2]>) -> Result<TrackOutcome> {
        let viewed_at = *self.route_view_start.lock();
        let duration = viewed_at.map_or(0, |t| (self.clock.now() - t).num_seconds().max(0) as u64);
        let options = TrackOptions {
            user_location,
            duration_on_route: Some(duration),
            action_result: Some(ActionResult::Success),
            ..Default::default()
        };
        self.track(EventType::Select, route_id, options).await
    }

    pub async fn track_route_click(&self, route_id: &RouteId) -> Result<TrackOutcome> {
        self.track(EventType::Click, route_id, TrackOptions::default()).await
    }

    /// Adding a favorite is a success, removing one is recorded as abandoned
    pub async fn track_favorite(&self, route_id: &RouteId, favorited: bool) -> Result<TrackOutcome> {
        let result = if favorited { ActionResult::Success } else { ActionResult::Abandoned };
        let options = TrackOptions { action_result: Some(result), ..Default::default() };
        self.track(EventType::Favorite, route_id, options).await
    }

    /// A search that surfaced `route_id`; no results counts as abandoned
    pub async fn track_search(&self, route_id: &RouteId, query: &str, result_count: u32) -> Result<TrackOutcome> {
        let options = TrackOptions {
            search_query: Some(query.to_string()),
            result_count: Some(result_count),
            action_result: Some(if result_count > 0 { ActionResult::Success } else { ActionResult::Abandoned }),
            ..Default::default()
        };
        self.track(EventType::Search, route_id, options).await
    }

    pub async fn session_stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.session_id.clone(),
            duration: self.session_duration(),
            start_time: self.session_start,
            is_online: self.is_online(),
            device_info: self.device_info.clone(),
            pending_events: self.queue.pending_count().await,
        }
    }

    /// Drop delivered and rejected records from the local queue
    pub async fn clear_synced(&self) -> Result<usize> {
        self.queue.clear_synced().await
    }
}
