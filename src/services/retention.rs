//! Retention sweeper - expires events and metrics past their window

use crate::error::Result;
use crate::infra::{Clock, Metrics, Store};
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Clone)]
pub struct RetentionSweeper {
    store: Store,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    events_days: i64,
    metrics_days: i64,
}

/// Rows removed by one sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub events: u64,
    pub metrics: u64,
}

impl RetentionSweeper {
    pub fn new(
        store: Store,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        events_days: i64,
        metrics_days: i64,
    ) -> Self {
        Self { store, clock, metrics, events_days, metrics_days }
    }

    pub fn sweep_once(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let report = SweepReport {
            events: self.store.purge_events_before(now - Duration::days(self.events_days))?,
            metrics: self.store.purge_metrics_before(now - Duration::days(self.metrics_days))?,
        };
        self.metrics.record_expired(report.events, report.metrics);
        if report.events > 0 || report.metrics > 0 {
            info!(events = report.events, metrics = report.metrics, "retention_sweep");
        }
        Ok(report)
    }

    /// Sweep on every tick until shutdown
    pub async fn run(self, interval: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // purges hold the store lock; run them on the blocking pool
                    let sweeper = self.clone();
                    match tokio::task::spawn_blocking(move || sweeper.sweep_once()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => {
                            self.metrics.record_store_error();
                            error!(error = %e, "retention_sweep_failed");
                        }
                        Err(e) => error!(error = %e, "retention_sweep_panicked"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("retention_sweeper_shutdown");
                        break;
                    }
                }
            }
        }
    }
}
