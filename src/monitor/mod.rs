// src/monitor/mod.rs
//! # Failure Monitor
//! Aggregates failures into one alert per `(operation, target)` key over a
//! sliding window, escalates severity upward, resolves after a quiet period,
//! and rolls recent outcomes up into system health.
//!
//! Alert lifecycle per key: none → OPEN(info) → OPEN(warning) → OPEN(critical),
//! any OPEN → RESOLVED on a success after the quiet period, and a failure after
//! RESOLVED starts a new cycle with a new alert id.
//!
//! Each key has its own lock; the outer map lock is only held to find or
//! insert a slot, so different keys never contend on read-modify-write.

pub mod alert;
pub mod health;
pub mod store;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::{secs_to_duration, ConfigHandle};
use crate::error::{CollectionError, MonitoringError};
use crate::notify::{AlertSink, EVENT_ALERT_ESCALATED, EVENT_ALERT_RESOLVED};

pub use alert::{AlertKey, FailureAlert, FailureContext, OperationContext, Severity};
pub use health::{SystemHealth, SystemHealthMetrics};
pub use store::{AlertStore, JsonFileAlertStore};

const OUTCOME_CAP: usize = 10_000;

type Slot = Arc<Mutex<Option<FailureAlert>>>;

pub struct FailureMonitor {
    cfg: ConfigHandle,
    clock: SharedClock,
    sink: Arc<dyn AlertSink>,
    store: Option<Arc<dyn AlertStore>>,
    alerts: RwLock<HashMap<AlertKey, Slot>>,
    /// Resolved alerts displaced by a newer cycle on the same key.
    history: Mutex<Vec<FailureAlert>>,
    /// `(at, success)` samples for the health success rate.
    outcomes: Mutex<VecDeque<(DateTime<Utc>, bool)>>,
}

/// Severity change produced by one failure.
struct Escalation {
    from: Severity,
    to: Severity,
}

impl FailureMonitor {
    pub fn new(cfg: ConfigHandle, clock: SharedClock, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            cfg,
            clock,
            sink,
            store: None,
            alerts: RwLock::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn AlertStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn slot(&self, key: &AlertKey) -> Slot {
        if let Some(s) = self.alerts.read().get(key) {
            return s.clone();
        }
        self.alerts
            .write()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    fn existing_slot(&self, key: &AlertKey) -> Option<Slot> {
        self.alerts.read().get(key).cloned()
    }

    fn push_outcome(&self, at: DateTime<Utc>, success: bool) {
        let mut q = self.outcomes.lock();
        q.push_back((at, success));
        if q.len() > OUTCOME_CAP {
            q.pop_front();
        }
    }

    /// Count a failure for `(operation, ctx.target_id)` and return the updated alert.
    pub async fn record_failure(
        &self,
        operation: &str,
        error: &CollectionError,
        ctx: &OperationContext,
    ) -> FailureAlert {
        let now = self.clock.now();
        let mcfg = self.cfg.monitor();
        let window = secs_to_duration(mcfg.window_secs);
        let key = AlertKey::new(operation, &ctx.target_id);
        self.push_outcome(now, false);

        let (alert, escalation) = {
            let slot = self.slot(&key);
            let mut guard = slot.lock();

            let (mut a, previous) = match guard.take() {
                Some(mut a) if a.is_active() => {
                    a.count = a.count.saturating_add(1);
                    a.last_occurrence = now;
                    a.error_message = error.to_string();
                    a.last_error_class = error.class();
                    if ctx.correlation_id.is_some() {
                        a.correlation_id = ctx.correlation_id.clone();
                    }
                    // Failures older than the window don't count toward escalation.
                    if now.signed_duration_since(a.first_occurrence) > window {
                        a.count = 1;
                        a.first_occurrence = now;
                    }
                    let prev = a.severity;
                    (a, prev)
                }
                Some(resolved) => {
                    self.history.lock().push(resolved);
                    (FailureAlert::open(&key, error, ctx, now), Severity::Info)
                }
                None => (FailureAlert::open(&key, error, ctx, now), Severity::Info),
            };

            let by_count =
                Severity::for_count(a.count, mcfg.warning_threshold, mcfg.critical_threshold);
            // Severity only climbs inside a cycle.
            a.severity = a.severity.max(by_count);
            let escalation = (a.severity > previous).then_some(Escalation {
                from: previous,
                to: a.severity,
            });
            *guard = Some(a.clone());
            (a, escalation)
        };

        debug!(
            target: "monitor",
            operation,
            target_id = %alert.target_id,
            count = alert.count,
            severity = alert.severity.as_str(),
            class = alert.last_error_class.as_str(),
            "failure recorded"
        );

        self.persist(&alert).await;

        if let Some(esc) = escalation {
            warn!(
                target: "monitor",
                operation,
                target_id = %alert.target_id,
                from = esc.from.as_str(),
                to = esc.to.as_str(),
                count = alert.count,
                "alert escalated"
            );
            let payload = json!({
                "alert": &alert,
                "previous_severity": esc.from,
                "severity": esc.to,
            });
            self.emit(EVENT_ALERT_ESCALATED, &payload).await;
        }

        alert
    }

    /// Record a success. Resolves the open alert for the key only when the
    /// last failure is older than the resolve threshold. Returns whether an
    /// alert was resolved by this call.
    pub async fn record_success(&self, operation: &str, ctx: &OperationContext) -> bool {
        let now = self.clock.now();
        let quiet = secs_to_duration(self.cfg.monitor().resolve_threshold_secs);
        self.push_outcome(now, true);

        let key = AlertKey::new(operation, &ctx.target_id);
        let Some(slot) = self.existing_slot(&key) else {
            return false;
        };

        let resolved = {
            let mut guard = slot.lock();
            match guard.as_mut() {
                Some(a) if a.is_active() && now.signed_duration_since(a.last_occurrence) > quiet => {
                    a.resolve("recovered", now);
                    Some(a.clone())
                }
                _ => None,
            }
        };

        match resolved {
            Some(alert) => {
                info!(target: "monitor", operation, target_id = %alert.target_id, "alert resolved");
                self.persist(&alert).await;
                self.emit(EVENT_ALERT_RESOLVED, &json!({ "alert": &alert })).await;
                true
            }
            None => false,
        }
    }

    /// Manual override: resolve by id regardless of the quiet period.
    pub async fn resolve_alert(&self, id: &str, reason: &str) -> bool {
        let now = self.clock.now();
        let slots: Vec<Slot> = self.alerts.read().values().cloned().collect();

        let mut found = None;
        for slot in slots {
            let mut guard = slot.lock();
            if let Some(a) = guard.as_mut().filter(|a| a.id == id) {
                a.resolve(reason, now);
                found = Some(a.clone());
                break;
            }
        }

        match found {
            Some(alert) => {
                info!(target: "monitor", alert_id = id, reason, "alert resolved manually");
                self.persist(&alert).await;
                self.emit(EVENT_ALERT_RESOLVED, &json!({ "alert": &alert, "manual": true }))
                    .await;
                true
            }
            None => false,
        }
    }

    /// Purge resolved alerts whose last occurrence is older than `max_age`.
    /// Returns the number removed.
    pub async fn cleanup_old_alerts(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let is_stale =
            |a: &FailureAlert| a.resolved && now.signed_duration_since(a.last_occurrence) > max_age;

        let mut removed_ids = Vec::new();
        {
            let mut hist = self.history.lock();
            hist.retain(|a| {
                if is_stale(a) {
                    removed_ids.push(a.id.clone());
                    false
                } else {
                    true
                }
            });
        }
        // Slots stay in the map; emptying them keeps concurrent writers on the same key.
        let slots: Vec<Slot> = self.alerts.read().values().cloned().collect();
        for slot in slots {
            let mut guard = slot.lock();
            if guard.as_ref().is_some_and(|a| is_stale(a)) {
                if let Some(a) = guard.take() {
                    removed_ids.push(a.id);
                }
            }
        }

        if let Some(store) = &self.store {
            for id in &removed_ids {
                if let Err(e) = store.remove_alert(id).await {
                    warn!(target: "monitor", error = %e, "alert store cleanup failed");
                }
            }
        }
        if !removed_ids.is_empty() {
            info!(target: "monitor", removed = removed_ids.len(), "old alerts purged");
        }
        removed_ids.len()
    }

    pub fn alert(&self, operation: &str, target_id: &str) -> Option<FailureAlert> {
        self.existing_slot(&AlertKey::new(operation, target_id))
            .and_then(|s| s.lock().clone())
    }

    /// Unresolved alerts, sorted by key for stable output.
    pub fn active_alerts(&self) -> Vec<FailureAlert> {
        let mut out: Vec<FailureAlert> = self
            .current_alerts()
            .into_iter()
            .filter(FailureAlert::is_active)
            .collect();
        out.sort_by(|a, b| {
            (&a.operation_type, &a.target_id).cmp(&(&b.operation_type, &b.target_id))
        });
        out
    }

    pub fn alerts_for_target(&self, target_id: &str) -> Vec<FailureAlert> {
        self.all_alerts()
            .into_iter()
            .filter(|a| a.target_id == target_id)
            .collect()
    }

    /// Current alert per key plus displaced resolved ones.
    pub fn all_alerts(&self) -> Vec<FailureAlert> {
        let mut out = self.history.lock().clone();
        out.extend(self.current_alerts());
        out
    }

    fn current_alerts(&self) -> Vec<FailureAlert> {
        let slots: Vec<Slot> = self.alerts.read().values().cloned().collect();
        slots.iter().filter_map(|s| s.lock().clone()).collect()
    }

    /// Failure summary for the fallback selector.
    pub fn failure_context(&self, operation: &str, target_id: &str) -> Option<FailureContext> {
        self.alert(operation, target_id).map(|a| FailureContext::from(&a))
    }

    pub fn get_system_health_metrics(&self) -> SystemHealthMetrics {
        let now = self.clock.now();
        let window = secs_to_duration(self.cfg.monitor().window_secs);

        let (successes, failures) = {
            let mut q = self.outcomes.lock();
            while let Some(&(at, _)) = q.front() {
                if now.signed_duration_since(at) > window {
                    q.pop_front();
                } else {
                    break;
                }
            }
            let ok = q.iter().filter(|(_, s)| *s).count();
            (ok, q.len() - ok)
        };

        let active = self.active_alerts();
        let count = |sev: Severity| active.iter().filter(|a| a.severity == sev).count();
        let (critical, warning, info) = (
            count(Severity::Critical),
            count(Severity::Warning),
            count(Severity::Info),
        );
        let rate = health::success_rate(successes, failures);

        SystemHealthMetrics {
            overall_health: health::classify(critical, warning, rate),
            success_rate: rate,
            recent_successes: successes,
            recent_failures: failures,
            active_alerts: active.len(),
            critical_alerts: critical,
            warning_alerts: warning,
            info_alerts: info,
            computed_at: now,
        }
    }

    async fn persist(&self, alert: &FailureAlert) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.store_alert(alert).await {
            warn!(target: "monitor", alert_id = %alert.id, error = %e, "alert persistence failed");
        }
    }

    /// Emission is bounded by `sink_timeout_ms` so a slow sink cannot hold up
    /// the capture batch.
    async fn emit(&self, event: &str, payload: &serde_json::Value) {
        let timeout_ms = self.cfg.monitor().sink_timeout_ms;
        let limit = std::time::Duration::from_millis(timeout_ms);
        let err = match tokio::time::timeout(limit, self.sink.emit(event, payload)).await {
            Ok(Ok(())) => return,
            Ok(Err(source)) => MonitoringError::Sink {
                sink: self.sink.name().to_string(),
                source,
            },
            Err(_) => MonitoringError::SinkTimeout {
                sink: self.sink.name().to_string(),
                timeout_ms,
            },
        };
        warn!(target: "monitor", event, error = %err, "alert emission failed");
    }
}
