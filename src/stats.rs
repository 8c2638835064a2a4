// src/stats.rs
//! # Stats / Health
//! Read-only rollup over monitor state and fallback audit, plus the periodic
//! background health check that publishes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::{secs_to_duration, ConfigHandle};
use crate::fallback::{FallbackService, FallbackStats};
use crate::monitor::{FailureMonitor, SystemHealthMetrics};
use crate::notify::{AlertSink, EVENT_HEALTH_SNAPSHOT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub health: SystemHealthMetrics,
    /// Active alerts per severity.
    pub alerts_by_severity: BTreeMap<String, usize>,
    /// Active alerts per operation type.
    pub alerts_by_operation: BTreeMap<String, usize>,
    pub fallback: FallbackStats,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct StatsAggregator {
    monitor: Arc<FailureMonitor>,
    fallback: Arc<FallbackService>,
    clock: SharedClock,
}

impl StatsAggregator {
    pub fn new(monitor: Arc<FailureMonitor>, fallback: Arc<FallbackService>, clock: SharedClock) -> Self {
        Self {
            monitor,
            fallback,
            clock,
        }
    }

    pub fn collect(&self) -> StatsReport {
        let health = self.monitor.get_system_health_metrics();
        let mut by_severity = BTreeMap::new();
        let mut by_operation = BTreeMap::new();
        for a in self.monitor.active_alerts() {
            *by_severity.entry(a.severity.as_str().to_string()).or_insert(0) += 1;
            *by_operation.entry(a.operation_type).or_insert(0) += 1;
        }
        StatsReport {
            health,
            alerts_by_severity: by_severity,
            alerts_by_operation: by_operation,
            fallback: self.fallback.stats(),
            generated_at: self.clock.now(),
        }
    }
}

/* ----------------------------
Background health check
---------------------------- */

pub struct HealthCheckTask;

/// Owner of the running loop. `stop()` ends it cleanly; dropping aborts it.
pub struct HealthCheckHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl HealthCheckHandle {
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(target: "health", error = %e, "health loop ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }
}

impl Drop for HealthCheckHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

impl HealthCheckTask {
    /// Spawn the loop on the current tokio runtime. The first tick runs immediately.
    pub fn spawn(
        aggregator: StatsAggregator,
        sink: Arc<dyn AlertSink>,
        cfg: ConfigHandle,
        interval: Duration,
    ) -> HealthCheckHandle {
        let (tx, mut rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_health_check(&aggregator, sink.as_ref(), &cfg).await;
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            debug!(target: "health", "health loop stopping");
                            break;
                        }
                    }
                }
            }
        });
        info!(target: "health", interval_secs = interval.as_secs(), "health loop started");
        HealthCheckHandle {
            shutdown: tx,
            join: Some(join),
        }
    }
}

/// One health tick. Failures are logged and swallowed.
pub async fn run_health_check(aggregator: &StatsAggregator, sink: &dyn AlertSink, cfg: &ConfigHandle) -> StatsReport {
    let max_age = secs_to_duration(cfg.monitor().resolved_alert_max_age_secs);
    aggregator.monitor.cleanup_old_alerts(max_age).await;

    let report = aggregator.collect();
    match serde_json::to_value(&report) {
        Ok(payload) => {
            if let Err(e) = sink.emit(EVENT_HEALTH_SNAPSHOT, &payload).await {
                warn!(target: "health", error = %format!("{e:#}"), "health snapshot emission failed");
            }
        }
        Err(e) => warn!(target: "health", error = %e, "health snapshot serialization failed"),
    }
    debug!(
        target: "health",
        overall = ?report.health.overall_health,
        success_rate = report.health.success_rate,
        active_alerts = report.health.active_alerts,
        "health check"
    );
    report
}
