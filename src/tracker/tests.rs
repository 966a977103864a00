//! Tests for the offline event tracker

use super::*;
use crate::infra::ManualClock;
use chrono::TimeZone;
use std::sync::atomic::AtomicUsize;

/// In-process sink recording what it receives
#[derive(Default)]
struct MockSink {
    failing: AtomicBool,
    rejecting: AtomicBool,
    delay: Option<Duration>,
    delivered: Mutex<Vec<(String, OutgoingEvent)>>,
    calls: AtomicUsize,
}

impl MockSink {
    fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Default::default() }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    fn delivered(&self) -> Vec<(String, OutgoingEvent)> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl EventSink for MockSink {
    async fn deliver(&self, session_id: &str, event: &OutgoingEvent) -> Result<EventAck> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".to_string()));
        }
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(Error::Rejected { status: 400, message: "eventType: is required".to_string() });
        }
        self.delivered.lock().push((session_id.to_string(), event.clone()));
        Ok(EventAck { message: "Event recorded".to_string(), event_id: format!("evt-{n}") })
    }
}

struct Harness {
    tracker: Arc<EventTracker>,
    sink: Arc<MockSink>,
    clock: Arc<ManualClock>,
    online: watch::Sender<bool>,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap()
}

fn harness_with(sink: MockSink, queue: PendingQueue, online: bool) -> Harness {
    let sink = Arc::new(sink);
    let clock = Arc::new(ManualClock::new(start()));
    let (tx, rx) = watch::channel(online);
    let tracker = EventTracker::new(sink.clone(), clock.clone(), rx, queue)
        .with_device_info(device_info_from_user_agent("Mozilla/5.0 (X11; Linux x86_64) Firefox/131.0", None));
    Harness { tracker: Arc::new(tracker), sink, clock, online: tx }
}

fn harness(online: bool) -> Harness {
    harness_with(MockSink::default(), PendingQueue::in_memory(), online)
}

fn route() -> RouteId {
    RouteId::from("r1")
}

#[tokio::test]
async fn test_online_track_delivers() {
    let h = harness(true);
    h.clock.advance(chrono::Duration::seconds(12));

    let outcome = h.tracker.track(EventType::Share, &route(), TrackOptions::default()).await.unwrap();
    assert!(matches!(outcome, TrackOutcome::Delivered(ref ack) if ack.event_id == "evt-0"));

    let delivered = h.sink.delivered();
    assert_eq!(delivered.len(), 1);
    let (session, event) = &delivered[0];
    assert_eq!(session, h.tracker.session_id());
    assert_eq!(event.session_duration, 12);
    assert_eq!(event.action_result, ActionResult::Success);
    assert_eq!(event.device_info.as_ref().and_then(|d| d.browser.as_deref()), Some("Firefox"));
    assert!(h.tracker.queue().snapshot().await.is_empty());
}

#[tokio::test]
async fn test_offline_track_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue").join("pending.json");
    let h = harness_with(MockSink::default(), PendingQueue::open(&path).await.unwrap(), false);

    let id = match h.tracker.track_route_click(&route()).await.unwrap() {
        TrackOutcome::Queued(id) => id,
        other => panic!("expected queued, got {other:?}"),
    };
    assert_eq!(h.sink.calls.load(Ordering::SeqCst), 0);

    let reopened = PendingQueue::open(&path).await.unwrap().snapshot().await;
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened[0].id, id);
    assert!(!reopened[0].synced);
    assert_eq!(reopened[0].event.event_type, EventType::Click);
    assert_eq!(reopened[0].captured_at, start());
}

#[tokio::test]
async fn test_failed_delivery_is_queued() {
    let h = harness(true);
    h.sink.set_failing(true);

    let outcome = h.tracker.track_route_click(&route()).await.unwrap();
    assert!(matches!(outcome, TrackOutcome::Queued(_)));
    assert_eq!(h.tracker.queue().pending_count().await, 1);
}

#[tokio::test]
async fn test_slow_delivery_times_out_and_is_queued() {
    let h = harness_with(MockSink::slow(Duration::from_millis(500)), PendingQueue::in_memory(), true);
    let tracker = Arc::try_unwrap(h.tracker).ok().unwrap().with_timeout(Duration::from_millis(50));

    let outcome = tracker.track_route_click(&route()).await.unwrap();
    assert!(matches!(outcome, TrackOutcome::Queued(_)));
    assert!(h.sink.delivered().is_empty());
}

#[tokio::test]
async fn test_sync_is_noop_offline() {
    let h = harness(false);
    h.tracker.track_route_click(&route()).await.unwrap();
    assert_eq!(h.tracker.sync_pending().await.unwrap(), None);
    assert_eq!(h.tracker.queue().pending_count().await, 1);
}

#[tokio::test]
async fn test_sync_delivers_once() {
    let h = harness(false);
    for _ in 0..3 {
        h.tracker.track_route_click(&route()).await.unwrap();
    }

    h.online.send(true).unwrap();
    let report = h.tracker.sync_pending().await.unwrap().unwrap();
    assert_eq!(report, SyncReport { attempted: 3, delivered: 3, failed: 0, rejected: 0 });
    assert!(h.tracker.queue().snapshot().await.iter().all(|r| r.synced));

    // synced records are not redelivered
    let report = h.tracker.sync_pending().await.unwrap().unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(h.sink.delivered().len(), 3);
}

#[tokio::test]
async fn test_failed_sync_keeps_records() {
    let h = harness(false);
    h.tracker.track_route_click(&route()).await.unwrap();
    h.tracker.track_favorite(&route(), true).await.unwrap();

    h.online.send(true).unwrap();
    h.sink.set_failing(true);
    let report = h.tracker.sync_pending().await.unwrap().unwrap();
    assert_eq!(report, SyncReport { attempted: 2, delivered: 0, failed: 2, rejected: 0 });
    assert_eq!(h.tracker.queue().pending_count().await, 2);

    h.sink.set_failing(false);
    let report = h.tracker.sync_pending().await.unwrap().unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(h.tracker.queue().pending_count().await, 0);
}

#[tokio::test]
async fn test_clear_synced_compacts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending.json");
    let h = harness_with(MockSink::default(), PendingQueue::open(&path).await.unwrap(), false);
    h.tracker.track_route_click(&route()).await.unwrap();
    h.tracker.track_route_click(&route()).await.unwrap();

    h.online.send(true).unwrap();
    h.tracker.sync_pending().await.unwrap();
    assert_eq!(h.tracker.clear_synced().await.unwrap(), 2);
    assert_eq!(h.tracker.clear_synced().await.unwrap(), 0);
    assert!(PendingQueue::open(&path).await.unwrap().snapshot().await.is_empty());
}

#[tokio::test]
async fn test_overlapping_sync_is_collapsed() {
    let h = harness_with(MockSink::slow(Duration::from_millis(100)), PendingQueue::in_memory(), false);
    h.tracker.track_route_click(&route()).await.unwrap();
    h.online.send(true).unwrap();

    let (a, b) = tokio::join!(h.tracker.sync_pending(), h.tracker.sync_pending());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.is_some() != b.is_some(), "exactly one pass should run: {a:?} {b:?}");
    assert_eq!(h.sink.delivered().len(), 1);
}

#[tokio::test]
async fn test_select_measures_time_since_view() {
    let h = harness(true);
    h.tracker.track_route_view(&route(), Some([20.52, -100.81])).await.unwrap();
    h.clock.advance(chrono::Duration::seconds(42));
    h.tracker.track_route_select(&route(), None).await.unwrap();

    let delivered = h.sink.delivered();
    assert_eq!(delivered[0].1.event_type, EventType::View);
    assert_eq!(delivered[0].1.duration_on_route, Some(0));
    assert_eq!(delivered[0].1.user_location, Some([20.52, -100.81]));
    assert_eq!(delivered[1].1.event_type, EventType::Select);
    assert_eq!(delivered[1].1.duration_on_route, Some(42));
}

#[tokio::test]
async fn test_select_without_view_is_zero() {
    let h = harness(true);
    h.tracker.track_route_select(&route(), None).await.unwrap();
    assert_eq!(h.sink.delivered()[0].1.duration_on_route, Some(0));
}

#[tokio::test]
async fn test_favorite_and_search_results() {
    let h = harness(true);
    h.tracker.track_favorite(&route(), true).await.unwrap();
    h.tracker.track_favorite(&route(), false).await.unwrap();
    h.tracker.track_search(&route(), "centro", 4).await.unwrap();
    h.tracker.track_search(&route(), "zzz", 0).await.unwrap();

    let results: Vec<_> = h.sink.delivered().into_iter().map(|(_, e)| e.action_result).collect();
    assert_eq!(
        results,
        [ActionResult::Success, ActionResult::Abandoned, ActionResult::Success, ActionResult::Abandoned]
    );
    let search = &h.sink.delivered()[2].1;
    assert_eq!(search.search_query.as_deref(), Some("centro"));
    assert_eq!(search.result_count, Some(4));
}

#[tokio::test]
async fn test_session_stats() {
    let h = harness(false);
    h.clock.advance(chrono::Duration::minutes(3));
    h.tracker.track_route_click(&route()).await.unwrap();

    let stats = h.tracker.session_stats().await;
    assert_eq!(stats.session_id, h.tracker.session_id());
    assert_eq!(stats.duration, 180);
    assert_eq!(stats.start_time, start());
    assert!(!stats.is_online);
    assert_eq!(stats.pending_events, 1);
}

#[tokio::test]
async fn test_sync_loop_runs_on_reconnect() {
    let h = harness(false);
    h.tracker.track_route_click(&route()).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(h.tracker.clone().run_sync_loop(Duration::from_secs(3600), shutdown_rx));

    h.online.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while h.tracker.queue().pending_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reconnect should trigger a sync");
    assert_eq!(h.sink.delivered().len(), 1);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_sync_loop_delivers_on_tick() {
    let h = harness(true);
    h.sink.set_failing(true);
    let outcome = h.tracker.track_route_click(&route()).await.unwrap();
    assert!(matches!(outcome, TrackOutcome::Queued(_)));
    h.sink.set_failing(false);

    // connectivity never changes, so only the interval can drive the retry
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(h.tracker.clone().run_sync_loop(Duration::from_millis(50), shutdown_rx));

    tokio::time::timeout(Duration::from_secs(2), async {
        while h.tracker.queue().pending_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("a tick should sync the queued record");
    assert_eq!(h.sink.delivered().len(), 1);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_rejected_event_is_not_queued() {
    let h = harness(true);
    h.sink.set_rejecting(true);

    let err = h.tracker.track_route_click(&route()).await.unwrap_err();
    assert!(matches!(err, Error::Rejected { status: 400, .. }));
    assert!(h.tracker.queue().snapshot().await.is_empty());
}

#[tokio::test]
async fn test_rejected_record_is_dead_lettered() {
    let h = harness(false);
    h.tracker.track_route_click(&route()).await.unwrap();
    h.tracker.track_route_click(&route()).await.unwrap();

    h.online.send(true).unwrap();
    h.sink.set_rejecting(true);
    let report = h.tracker.sync_pending().await.unwrap().unwrap();
    assert_eq!(report, SyncReport { attempted: 2, delivered: 0, failed: 0, rejected: 2 });
    assert_eq!(h.tracker.queue().pending_count().await, 0);
    let records = h.tracker.queue().snapshot().await;
    assert!(records.iter().all(|r| r.rejected.as_deref().is_some_and(|why| why.contains("HTTP 400"))));

    // dead letters are not retried
    h.sink.set_rejecting(false);
    let report = h.tracker.sync_pending().await.unwrap().unwrap();
    assert_eq!(report.attempted, 0);
    assert!(h.sink.delivered().is_empty());

    assert_eq!(h.tracker.clear_synced().await.unwrap(), 2);
}

#[tokio::test]
async fn test_from_config_uses_tracker_section() {
    let dir = tempfile::tempdir().unwrap();
    let queue_file = dir.path().join("state").join("pending.json");
    let config_file = dir.path().join("client.toml");
    std::fs::write(
        &config_file,
        format!(
            "[tracker]\napi_base = \"http://127.0.0.1:9\"\nrequest_timeout_ms = 200\nqueue_file = '{}'\n",
            queue_file.display()
        ),
    )
    .unwrap();
    let config = Config::from_file(&config_file).unwrap();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(start()));

    let (_online_tx, online_rx) = watch::channel(false);
    let tracker = EventTracker::from_config(&config, clock.clone(), online_rx.clone()).await.unwrap();
    let outcome = tracker.track_route_click(&route()).await.unwrap();
    assert!(matches!(outcome, TrackOutcome::Queued(_)));
    assert!(queue_file.exists());

    // a fresh tracker on the same config picks the buffered record back up
    let restarted = EventTracker::from_config(&config, clock, online_rx).await.unwrap();
    assert_eq!(restarted.session_stats().await.pending_events, 1);
}
