// src/scheduler.rs
//! # Task Scheduler
//! Builds capture tasks from freshness decisions, orders them by priority
//! (stable on ties), and runs them strictly one at a time with a flat pause
//! after each task to throttle load on scraped sites and the capture backend.
//!
//! A failing task never aborts the batch; each outcome is reported to the
//! failure monitor.

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::ConfigHandle;
use crate::error::{CollectionError, ErrorClass};
use crate::freshness::{self, Priority};
use crate::monitor::{FailureMonitor, OperationContext};
use crate::target::{CollectionTarget, Collector, SnapshotStore};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("refresh_runs_total", "Scheduling runs started.");
        describe_counter!("refresh_tasks_total", "Capture tasks executed.");
        describe_counter!(
            "refresh_task_failures_total",
            "Capture tasks that failed, by error class."
        );
        describe_histogram!("refresh_capture_ms", "Capture duration in milliseconds.");
    });
}

/// Ephemeral unit of work for one scheduling run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapingTask {
    pub target: CollectionTarget,
    pub priority: Priority,
    pub reason: String,
    /// Position of the target in the input list.
    pub discovery_order: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub target_id: String,
    pub priority: Priority,
    pub success: bool,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_class: Option<ErrorClass>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerRunResult {
    pub triggered: bool,
    pub tasks_executed: usize,
    pub results: Vec<TaskResult>,
    pub duration_ms: u64,
    pub correlation_id: String,
    /// Set when the batch itself could not run.
    #[serde(default)]
    pub error: Option<String>,
}

impl SchedulerRunResult {
    fn failed(correlation_id: String, started: Instant, error: String) -> Self {
        Self {
            triggered: false,
            tasks_executed: 0,
            results: Vec::new(),
            duration_ms: elapsed_ms(started),
            correlation_id,
            error: Some(error),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

/// Stable sort by priority rank; equal priorities keep discovery order.
pub fn order_tasks(tasks: &mut [ScrapingTask]) {
    tasks.sort_by_key(|t| t.priority.rank());
}

/// Reject targets that cannot possibly be captured.
pub fn validate_target(target: &CollectionTarget) -> Result<(), CollectionError> {
    if target.id.trim().is_empty() {
        return Err(CollectionError::structural("target has no id"));
    }
    if target.url.trim().is_empty() {
        return Err(CollectionError::structural(format!(
            "target `{}` has no url",
            target.id
        )));
    }
    if target.host().is_none() {
        return Err(CollectionError::structural(format!(
            "target `{}` has an unusable url `{}`",
            target.id, target.url
        )));
    }
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u64::MAX as u128) as u64
}

pub struct TaskScheduler {
    cfg: ConfigHandle,
    clock: SharedClock,
    store: Arc<dyn SnapshotStore>,
    collector: Arc<dyn Collector>,
    monitor: Arc<FailureMonitor>,
}

impl TaskScheduler {
    pub fn new(
        cfg: ConfigHandle,
        clock: SharedClock,
        store: Arc<dyn SnapshotStore>,
        collector: Arc<dyn Collector>,
        monitor: Arc<FailureMonitor>,
    ) -> Self {
        Self {
            cfg,
            clock,
            store,
            collector,
            monitor,
        }
    }

    /// Freshness-evaluate every target and return the required tasks, ordered.
    ///
    /// A target whose snapshot lookup fails is scheduled at HIGH, since its
    /// freshness is unknown. Only a store that fails for every target is a
    /// batch-level error.
    pub async fn plan(&self, targets: &[CollectionTarget]) -> Result<Vec<ScrapingTask>> {
        let policy = self.cfg.freshness();
        let now = self.clock.now();

        let mut tasks = Vec::new();
        let mut lookup_errors = 0usize;
        let mut last_error = None;
        for (discovery_order, target) in targets.iter().enumerate() {
            let lookup = self
                .store
                .latest_successful(&target.id)
                .await
                .with_context(|| format!("reading latest snapshot for `{}`", target.id));
            let latest = match lookup {
                Ok(latest) => latest,
                Err(e) => {
                    warn!(target: "scheduler", target_id = %target.id, error = %format!("{e:#}"), "snapshot lookup failed; scheduling capture");
                    tasks.push(ScrapingTask {
                        target: target.clone(),
                        priority: Priority::High,
                        reason: format!("snapshot lookup failed: {e:#}"),
                        discovery_order,
                    });
                    lookup_errors += 1;
                    last_error = Some(e);
                    continue;
                }
            };
            let decision = freshness::evaluate(target, latest.as_ref(), &policy, now);
            if !decision.required {
                debug!(target: "scheduler", target_id = %target.id, reason = %decision.reason, "fresh; skipped");
                continue;
            }
            tasks.push(ScrapingTask {
                target: target.clone(),
                priority: decision.priority,
                reason: decision.reason,
                discovery_order,
            });
        }
        if let Some(e) = last_error {
            if lookup_errors == targets.len() {
                return Err(e.context("snapshot store unavailable"));
            }
        }
        order_tasks(&mut tasks);
        Ok(tasks)
    }

    /// Plan and execute one batch. Never returns an error: batch-level
    /// problems come back as `triggered: false` with `error` set.
    pub async fn run(&self, targets: &[CollectionTarget]) -> SchedulerRunResult {
        ensure_metrics_described();
        counter!("refresh_runs_total").increment(1);

        let started = Instant::now();
        let correlation_id = uuid::Uuid::new_v4().to_string();

        let tasks = match self.plan(targets).await {
            Ok(t) => t,
            Err(e) => {
                let msg = format!("{e:#}");
                warn!(target: "scheduler", correlation_id = %correlation_id, error = %msg, "planning failed");
                return SchedulerRunResult::failed(correlation_id, started, msg);
            }
        };

        if tasks.is_empty() {
            info!(target: "scheduler", targets = targets.len(), "all targets fresh; nothing to do");
            return SchedulerRunResult {
                triggered: false,
                tasks_executed: 0,
                results: Vec::new(),
                duration_ms: elapsed_ms(started),
                correlation_id,
                error: None,
            };
        }

        let scfg = self.cfg.current().scheduler;
        let delay = Duration::from_millis(scfg.inter_task_delay_ms);
        info!(
            target: "scheduler",
            correlation_id = %correlation_id,
            tasks = tasks.len(),
            targets = targets.len(),
            "starting capture batch"
        );

        let mut results = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let res = self.execute_task(task, &scfg.operation, &correlation_id).await;
            results.push(res);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let failed = results.iter().filter(|r| !r.success).count();
        info!(
            target: "scheduler",
            correlation_id = %correlation_id,
            executed = results.len(),
            failed,
            "capture batch finished"
        );

        SchedulerRunResult {
            triggered: true,
            tasks_executed: results.len(),
            results,
            duration_ms: elapsed_ms(started),
            correlation_id,
            error: None,
        }
    }

    async fn execute_task(&self, task: &ScrapingTask, operation: &str, correlation_id: &str) -> TaskResult {
        let target = &task.target;
        let ctx = OperationContext::new(target.id.clone()).with_correlation(correlation_id);
        counter!("refresh_tasks_total").increment(1);

        let started = Instant::now();
        let outcome = match validate_target(target) {
            Ok(()) => {
                let o = self.collector.capture(target).await;
                match (o.success, o.snapshot_id, o.error) {
                    (true, Some(id), _) => Ok((id, o.duration_ms)),
                    (true, None, _) => Err((
                        CollectionError::structural("collector reported success without a snapshot id"),
                        o.duration_ms,
                    )),
                    (false, _, Some(err)) => Err((err, o.duration_ms)),
                    (false, _, None) => Err((
                        CollectionError::transient("collector reported failure without an error"),
                        o.duration_ms,
                    )),
                }
            }
            Err(err) => Err((err, elapsed_ms(started))),
        };

        match outcome {
            Ok((snapshot_id, duration_ms)) => {
                histogram!("refresh_capture_ms").record(duration_ms as f64);
                self.monitor.record_success(operation, &ctx).await;
                debug!(target: "scheduler", target_id = %target.id, %snapshot_id, duration_ms, "captured");
                TaskResult {
                    target_id: target.id.clone(),
                    priority: task.priority,
                    success: true,
                    snapshot_id: Some(snapshot_id),
                    error: None,
                    error_class: None,
                    duration_ms,
                }
            }
            Err((err, duration_ms)) => {
                let class = err.class();
                counter!("refresh_task_failures_total", "class" => class.as_str()).increment(1);
                let alert = self.monitor.record_failure(operation, &err, &ctx).await;
                warn!(
                    target: "scheduler",
                    target_id = %target.id,
                    class = class.as_str(),
                    failures = alert.count,
                    error = %err,
                    "capture failed"
                );
                TaskResult {
                    target_id: target.id.clone(),
                    priority: task.priority,
                    success: false,
                    snapshot_id: None,
                    error: Some(err.to_string()),
                    error_class: Some(class),
                    duration_ms,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetKind;

    fn task(id: &str, priority: Priority, order: usize) -> ScrapingTask {
        ScrapingTask {
            target: CollectionTarget::new(id, TargetKind::Competitor, "https://x.io"),
            priority,
            reason: String::new(),
            discovery_order: order,
        }
    }

    #[test]
    fn ordering_is_stable_within_priority() {
        let mut tasks = vec![
            task("a", Priority::Low, 0),
            task("b", Priority::High, 1),
            task("c", Priority::Medium, 2),
            task("d", Priority::High, 3),
        ];
        order_tasks(&mut tasks);
        let ids: Vec<&str> = tasks.iter().map(|t| t.target.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn validation_tags_broken_targets_as_structural() {
        let ok = CollectionTarget::new("a", TargetKind::Product, "https://acme.io");
        assert!(validate_target(&ok).is_ok());

        let no_url = CollectionTarget::new("b", TargetKind::Product, "  ");
        assert_eq!(
            validate_target(&no_url).unwrap_err().class(),
            ErrorClass::Structural
        );

        let bad_url = CollectionTarget::new("c", TargetKind::Product, "acme dot io");
        assert!(validate_target(&bad_url).is_err());
    }
}
