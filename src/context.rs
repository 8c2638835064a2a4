// src/context.rs
//! Composition root: builds every service once and hands out shared handles.
//! Also prepares per-target input for the downstream report compiler.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::clock::{system_clock, SharedClock};
use crate::config::{ConfigHandle, RefreshConfig};
use crate::error::ErrorClass;
use crate::fallback::{
    ContentDeriver, FallbackContent, FallbackOutcome, FallbackService, FallbackSources,
    InMemoryManualStore, ManualOverrideStore, StrategyKind, StrategyRegistry,
};
use crate::freshness;
use crate::monitor::{AlertStore, FailureContext, FailureMonitor};
use crate::notify::{AlertSink, LogSink};
use crate::scheduler::{SchedulerRunResult, TaskScheduler};
use crate::stats::{HealthCheckHandle, HealthCheckTask, StatsAggregator};
use crate::target::{CollectionTarget, Collector, SnapshotStore};

/// What the report compiler receives for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportInput {
    /// A real captured snapshot. `stale` is set when it is past the freshness threshold.
    Snapshot {
        snapshot_id: String,
        captured_at: DateTime<Utc>,
        stale: bool,
    },
    /// Substitute content; the report must flag its source and confidence.
    Degraded {
        strategy: StrategyKind,
        content: FallbackContent,
    },
    Unavailable {
        reason: String,
        remediation: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReport {
    pub target_id: String,
    pub input: ReportInput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshOutcome {
    pub run: SchedulerRunResult,
    pub inputs: Vec<TargetReport>,
}

pub struct RefreshContext {
    pub config: ConfigHandle,
    pub clock: SharedClock,
    pub sink: Arc<dyn AlertSink>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub monitor: Arc<FailureMonitor>,
    pub scheduler: TaskScheduler,
    pub fallback: Arc<FallbackService>,
    pub stats: StatsAggregator,
}

pub struct RefreshContextBuilder {
    config: RefreshConfig,
    snapshots: Arc<dyn SnapshotStore>,
    collector: Arc<dyn Collector>,
    clock: SharedClock,
    sink: Arc<dyn AlertSink>,
    manual: Arc<dyn ManualOverrideStore>,
    deriver: Option<Arc<dyn ContentDeriver>>,
    alert_store: Option<Arc<dyn AlertStore>>,
}

impl RefreshContextBuilder {
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn manual_store(mut self, manual: Arc<dyn ManualOverrideStore>) -> Self {
        self.manual = manual;
        self
    }

    pub fn deriver(mut self, deriver: Arc<dyn ContentDeriver>) -> Self {
        self.deriver = Some(deriver);
        self
    }

    pub fn alert_store(mut self, store: Arc<dyn AlertStore>) -> Self {
        self.alert_store = Some(store);
        self
    }

    pub fn build(self) -> RefreshContext {
        let config = ConfigHandle::new(self.config.sanitized());
        let cfg = config.current();

        let mut monitor = FailureMonitor::new(config.clone(), self.clock.clone(), self.sink.clone());
        if let Some(store) = self.alert_store {
            monitor = monitor.with_store(store);
        }
        let monitor = Arc::new(monitor);

        let registry = Arc::new(StrategyRegistry::live(config.clone()));
        let fallback = Arc::new(FallbackService::new(
            registry,
            FallbackSources {
                snapshots: self.snapshots.clone(),
                manual: self.manual,
                deriver: self.deriver,
            },
            self.clock.clone(),
            cfg.fallback.audit_capacity,
        ));

        let scheduler = TaskScheduler::new(
            config.clone(),
            self.clock.clone(),
            self.snapshots.clone(),
            self.collector,
            monitor.clone(),
        );
        let stats = StatsAggregator::new(monitor.clone(), fallback.clone(), self.clock.clone());

        RefreshContext {
            config,
            clock: self.clock,
            sink: self.sink,
            snapshots: self.snapshots,
            monitor,
            scheduler,
            fallback,
            stats,
        }
    }
}

impl RefreshContext {
    pub fn builder(
        config: RefreshConfig,
        snapshots: Arc<dyn SnapshotStore>,
        collector: Arc<dyn Collector>,
    ) -> RefreshContextBuilder {
        RefreshContextBuilder {
            config,
            snapshots,
            collector,
            clock: system_clock(),
            sink: Arc::new(LogSink),
            manual: Arc::new(InMemoryManualStore::new()),
            deriver: None,
            alert_store: None,
        }
    }

    /// Start the periodic health check at the configured interval.
    pub fn spawn_health_check(&self) -> HealthCheckHandle {
        let secs = self.config.monitor().health_check_interval_secs;
        HealthCheckTask::spawn(
            self.stats.clone(),
            self.sink.clone(),
            self.config.clone(),
            Duration::from_secs(secs),
        )
    }

    /// Run one scheduling batch, then decide what the report gets per target.
    pub async fn refresh(&self, targets: &[CollectionTarget]) -> RefreshOutcome {
        let run = self.scheduler.run(targets).await;
        let mut inputs = Vec::with_capacity(targets.len());
        for target in targets {
            let input = self.report_input_for(target, &run).await;
            inputs.push(TargetReport {
                target_id: target.id.clone(),
                input,
            });
        }
        RefreshOutcome { run, inputs }
    }

    /// Report input for one target given the latest run. Never fails.
    pub async fn report_input_for(&self, target: &CollectionTarget, run: &SchedulerRunResult) -> ReportInput {
        let now = self.clock.now();
        let captured = run
            .results
            .iter()
            .find(|r| r.target_id == target.id && r.success)
            .and_then(|r| r.snapshot_id.clone());
        if let Some(snapshot_id) = captured {
            return ReportInput::Snapshot {
                snapshot_id,
                captured_at: now,
                stale: false,
            };
        }

        let latest = match self.snapshots.latest_successful(&target.id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(target: "report", target_id = %target.id, error = %format!("{e:#}"), "snapshot lookup failed");
                None
            }
        };
        let policy = self.config.freshness();
        if let Some(snap) = &latest {
            if !freshness::evaluate(target, Some(snap), &policy, now).required {
                return ReportInput::Snapshot {
                    snapshot_id: snap.id.clone(),
                    captured_at: snap.created_at,
                    stale: false,
                };
            }
        }

        let operation = self.config.current().scheduler.operation;
        let alert = self.monitor.alert(&operation, &target.id);
        if let Some(a) = alert.as_ref().filter(|a| a.is_active()) {
            let ctx = FailureContext::from(a);
            match self
                .fallback
                .degrade(target, &ctx, Some(run.correlation_id.as_str()))
                .await
            {
                FallbackOutcome::Content { strategy, content } => {
                    return ReportInput::Degraded { strategy, content }
                }
                FallbackOutcome::Unavailable { reason } => {
                    tracing::debug!(target: "report", target_id = %target.id, %reason, "no fallback");
                }
            }
        }

        if let Some(snap) = latest {
            return ReportInput::Snapshot {
                snapshot_id: snap.id,
                captured_at: snap.created_at,
                stale: true,
            };
        }

        let remediation = match alert.as_ref().map(|a| a.last_error_class) {
            Some(ErrorClass::Structural) => "Check the target's URL and configuration.",
            Some(ErrorClass::Transient) => "Collection is failing intermittently; retry the refresh later.",
            None => "No snapshot has been captured yet; run a refresh for this target.",
        };
        ReportInput::Unavailable {
            reason: "data unavailable".to_string(),
            remediation: remediation.to_string(),
        }
    }
}
