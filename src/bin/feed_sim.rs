//! Simulated vehicle telemetry and rider feed
//!
//! Moves a few vehicles along every route in the catalog and posts a
//! real-time metric for each on a fixed interval. Alongside the vehicles a
//! handful of simulated riders browse routes through the offline event
//! tracker, so losing the API buffers their events in `[tracker].queue_file`
//! until it comes back. Useful for exercising the API and dashboards without
//! a live AVL feed.
//!
//! Usage:
//!   cargo run --bin feed-sim -- --config config/dev.toml --ticks 20

use clap::Parser;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use transit_analytics::domain::route::Route;
use transit_analytics::infra::{Config, SystemClock};
use transit_analytics::io::ApiClient;
use transit_analytics::tracker::{device_info_from_user_agent, EventTracker};

const RIDER_USER_AGENT: &str =
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0 Mobile Safari/537.36";

#[derive(Parser, Debug)]
#[command(name = "feed-sim")]
#[command(about = "Post simulated vehicle telemetry to the transit analytics API")]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// API base URL, overrides [tracker].api_base
    #[arg(long)]
    api: Option<String>,

    /// Stop after this many ticks (0 = run until Ctrl+C)
    #[arg(long, default_value = "0")]
    ticks: u64,

    /// Simulated rider interactions per tick (0 disables riders)
    #[arg(long, default_value = "2")]
    riders: u32,
}

/// Route used when the catalog is empty
fn demo_route() -> Value {
    json!({
        "name": "Centro - Estacion",
        "city": "Celaya",
        "routeCode": "SIM-001",
        "gpsCoordinates": [[20.5235, -100.8157], [20.5290, -100.8120], [20.5370, -100.8045], [20.5430, -100.7990]],
        "timeToComplete": "35 min",
        "vehicleType": "bus"
    })
}

/// One rider interaction against a random route
async fn simulate_rider(tracker: &EventTracker, route: &Route) {
    let (choice, near_start, result_count) = {
        let mut rng = rand::rng();
        (rng.random_range(0..4u8), rng.random_bool(0.6), rng.random_range(0..5u32))
    };
    let location = route.gps_coordinates.first().copied().filter(|_| near_start);

    let outcome = match choice {
        0 => match tracker.track_route_view(&route.id, location).await {
            Ok(_) => tracker.track_route_select(&route.id, location).await,
            Err(e) => Err(e),
        },
        1 => tracker.track_route_click(&route.id).await,
        2 => tracker.track_favorite(&route.id, near_start).await,
        _ => tracker.track_search(&route.id, &route.route_code, result_count).await,
    };
    if let Err(e) = outcome {
        warn!(route_id = %route.id, error = %e, "rider_event_failed");
    }
}

/// One simulated vehicle moving back and forth along its route
struct Vehicle {
    vehicle_id: String,
    route_id: String,
    path: Vec<[f64; 2]>,
    /// Fractional position along `path`
    position: f64,
    forward: bool,
    delay: i64,
    occupancy: f64,
}

impl Vehicle {
    fn new(route: &Route, index: u32) -> Self {
        let mut rng = rand::rng();
        let last = route.gps_coordinates.len().saturating_sub(1) as f64;
        Self {
            vehicle_id: format!("{}-V{}", route.route_code, index + 1),
            route_id: route.id.to_string(),
            path: route.gps_coordinates.clone(),
            position: rng.random_range(0.0..=last.max(0.0)),
            forward: rng.random_bool(0.5),
            delay: rng.random_range(-60..=120),
            occupancy: rng.random_range(5.0..60.0),
        }
    }

    /// Interpolated `[lat, lon]` at the current position
    fn location(&self) -> [f64; 2] {
        let i = self.position.floor() as usize;
        let t = self.position - i as f64;
        match (self.path.get(i), self.path.get(i + 1)) {
            (Some(a), Some(b)) => [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t],
            (Some(a), None) => *a,
            _ => [0.0, 0.0],
        }
    }

    /// Advance one tick and produce the metric payload
    fn step(&mut self) -> Value {
        let mut rng = rand::rng();
        let last = self.path.len().saturating_sub(1) as f64;
        let stride = rng.random_range(0.05..0.3);

        if last > 0.0 {
            self.position += if self.forward { stride } else { -stride };
            if self.position >= last {
                self.position = last;
                self.forward = false;
            } else if self.position <= 0.0 {
                self.position = 0.0;
                self.forward = true;
            }
        }

        // Delay drifts; the occasional incident pushes it past the anomaly threshold
        self.delay += rng.random_range(-30..=45);
        if rng.random_bool(0.02) {
            self.delay += 900;
        }
        self.delay = self.delay.clamp(-300, 1800);
        self.occupancy = (self.occupancy + rng.random_range(-8.0..8.0)).clamp(0.0, 100.0);

        let speed = rng.random_range(10.0..45.0);
        let door_status = if speed < 12.0 { "open" } else { "closed" };

        json!({
            "vehicleId": self.vehicle_id,
            "routeId": self.route_id,
            "currentLocation": self.location(),
            "accuracy": rng.random_range(3.0..15.0),
            "occupancy": (self.occupancy * 10.0).round() / 10.0,
            "delay": self.delay,
            "speed": (speed * 10.0_f64).round() / 10.0,
            "doorStatus": door_status,
            "engineStatus": "running",
            "source": "simulated",
            "dataQuality": rng.random_range(80.0..100.0),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let mut config = Config::load_from_path(&config_path);
    if let Some(api) = &args.api {
        config = config.with_api_base(api);
    }

    let client = ApiClient::new(config.api_base(), Duration::from_millis(config.request_timeout_ms()))?;
    let health = client.health().await?;
    info!(api = %client.base(), status = %health["status"], version = %health["version"], "api_reachable");

    let mut routes = client.list_routes().await?;
    if routes.is_empty() {
        let ack = client.add_route(&demo_route()).await?;
        info!(route_id = %ack.route_id, route_code = %ack.route_code, "demo_route_seeded");
        routes = client.list_routes().await?;
    }

    let mut vehicles: Vec<Vehicle> = routes
        .iter()
        .filter(|r| !r.gps_coordinates.is_empty())
        .flat_map(|r| (0..config.sim_vehicles_per_route()).map(move |i| Vehicle::new(r, i)))
        .collect();
    info!(
        api = %client.base(),
        routes = routes.len(),
        vehicles = vehicles.len(),
        interval_secs = config.sim_interval_secs(),
        "feed_sim_started"
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        let _ = shutdown_tx.send(true);
    });

    let (online_tx, online_rx) = watch::channel(true);
    let tracker = Arc::new(
        EventTracker::from_config(&config, Arc::new(SystemClock), online_rx)
            .await?
            .with_device_info(device_info_from_user_agent(RIDER_USER_AGENT, Some("412x915"))),
    );
    let (sync_stop_tx, sync_stop_rx) = watch::channel(false);
    let sync_loop = tokio::spawn(
        tracker.clone().run_sync_loop(Duration::from_secs(config.sync_interval_secs().max(1)), sync_stop_rx),
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.sim_interval_secs().max(1)));
    let mut tick = 0u64;
    let (mut posted, mut failed) = (0u64, 0u64);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let payloads: Vec<Value> = vehicles.iter_mut().map(Vehicle::step).collect();
                let mut tick_posted = 0usize;
                for payload in &payloads {
                    match client.post_metric(payload).await {
                        Ok(_) => {
                            posted += 1;
                            tick_posted += 1;
                        }
                        Err(e) => {
                            failed += 1;
                            warn!(vehicle_id = %payload["vehicleId"], error = %e, "metric_post_failed");
                        }
                    }
                }

                // The tracker treats the API as reachable while telemetry gets through
                let reachable = payloads.is_empty() || tick_posted > 0;
                online_tx.send_if_modified(|online| std::mem::replace(online, reachable) != reachable);

                for _ in 0..args.riders {
                    if routes.is_empty() {
                        break;
                    }
                    let index = rand::rng().random_range(0..routes.len());
                    simulate_rider(&tracker, &routes[index]).await;
                }

                tick += 1;
                if args.ticks > 0 && tick >= args.ticks {
                    break;
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    let _ = sync_stop_tx.send(true);
    let _ = sync_loop.await;
    let session = tracker.session_stats().await;
    let cleared = tracker.clear_synced().await?;
    info!(
        session_id = %session.session_id,
        pending_events = session.pending_events,
        cleared,
        "rider_session_finished"
    );

    for route in &routes {
        match client.latest_metrics(&route.id).await {
            Ok(latest) => {
                let on_time = latest.iter().filter(|m| m.on_time_performance).count();
                let anomalies = latest.iter().filter(|m| m.is_anomaly).count();
                info!(route_code = %route.route_code, samples = latest.len(), on_time, anomalies, "route_latest_metrics");
            }
            Err(e) => warn!(route_code = %route.route_code, error = %e, "latest_metrics_failed"),
        }
    }

    info!(ticks = tick, posted, failed, "feed_sim_finished");
    Ok(())
}
