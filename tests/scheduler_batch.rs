// tests/scheduler_batch.rs
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Duration, TimeZone, Utc};
use snapshot_refresh::clock::ManualClock;
use snapshot_refresh::config::{ConfigHandle, RefreshConfig};
use snapshot_refresh::error::{CollectionError, ErrorClass};
use snapshot_refresh::monitor::FailureMonitor;
use snapshot_refresh::notify::RecordingSink;
use snapshot_refresh::target::{CaptureOutcome, InMemorySnapshotStore, ScriptedCollector};
use snapshot_refresh::{
    CollectionTarget, Priority, Snapshot, SnapshotStore, TargetKind, TaskScheduler,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 10, 12, 0, 0).unwrap()
}

fn target(id: &str) -> CollectionTarget {
    CollectionTarget::new(id, TargetKind::Competitor, format!("https://{id}.example.com/"))
}

fn snap(target_id: &str, age_days: i64) -> Snapshot {
    Snapshot {
        id: format!("{target_id}-{age_days}d"),
        target_id: target_id.into(),
        created_at: t0() - Duration::days(age_days),
        title: Some(target_id.to_uppercase()),
        description: None,
        content: String::new(),
        capture_success: true,
    }
}

struct Harness {
    scheduler: TaskScheduler,
    collector: Arc<ScriptedCollector>,
    monitor: Arc<FailureMonitor>,
    store: Arc<InMemorySnapshotStore>,
}

fn harness(delay_ms: u64) -> Harness {
    let mut cfg = RefreshConfig::default();
    cfg.scheduler.inter_task_delay_ms = delay_ms;
    let cfg = ConfigHandle::new(cfg);
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(InMemorySnapshotStore::new());
    let collector = Arc::new(ScriptedCollector::new());
    let monitor = Arc::new(FailureMonitor::new(
        cfg.clone(),
        clock.clone(),
        Arc::new(RecordingSink::new()),
    ));
    let scheduler = TaskScheduler::new(
        cfg,
        clock,
        store.clone(),
        collector.clone(),
        monitor.clone(),
    );
    Harness {
        scheduler,
        collector,
        monitor,
        store,
    }
}

#[tokio::test]
async fn stale_targets_run_high_first_and_fresh_ones_are_skipped() {
    let h = harness(0);
    // A: 20 days (HIGH), B: never captured (HIGH), C: 3 days (fresh), D: 10 days (MEDIUM)
    h.store.insert(snap("a", 20));
    h.store.insert(snap("c", 3));
    h.store.insert(snap("d", 10));
    let targets = vec![target("d"), target("a"), target("b"), target("c")];

    let tasks = h.scheduler.plan(&targets).await.unwrap();
    let ids: Vec<&str> = tasks.iter().map(|t| t.target.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "d"]);
    assert_eq!(tasks[0].priority, Priority::High);
    assert_eq!(tasks[1].priority, Priority::High);
    assert_eq!(tasks[1].reason, "no snapshot");
    assert_eq!(tasks[2].priority, Priority::Medium);

    let run = h.scheduler.run(&targets).await;
    assert!(run.triggered);
    assert_eq!(run.tasks_executed, 3);
    assert_eq!(h.collector.call_order(), vec!["a", "b", "d"]);
    assert!(run.results.iter().all(|r| r.success));
    assert!(run.results.iter().all(|r| r.target_id != "c"));
}

#[tokio::test]
async fn all_fresh_means_nothing_triggered() {
    let h = harness(0);
    h.store.insert(snap("a", 1));
    let run = h.scheduler.run(&[target("a")]).await;
    assert!(!run.triggered);
    assert_eq!(run.tasks_executed, 0);
    assert!(run.error.is_none());
    assert!(h.collector.call_order().is_empty());
}

#[tokio::test]
async fn one_failure_does_not_stop_the_batch() {
    let h = harness(0);
    h.collector
        .push("a", CaptureOutcome::failed(CollectionError::transient("navigation timeout"), 30_000));
    let targets = vec![target("a"), target("b")];

    let run = h.scheduler.run(&targets).await;
    assert!(run.triggered);
    assert_eq!(run.tasks_executed, 2);
    let failed: Vec<_> = run.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].target_id, "a");
    assert_eq!(failed[0].error_class, Some(ErrorClass::Transient));
    assert!(run.results[1].success);

    let alert = h.monitor.alert("snapshot_capture", "a").expect("alert recorded");
    assert_eq!(alert.count, 1);
    assert_eq!(alert.correlation_id.as_deref(), Some(run.correlation_id.as_str()));
    assert!(h.monitor.alert("snapshot_capture", "b").is_none());
}

#[tokio::test]
async fn invalid_url_is_a_structural_failure_without_capture() {
    let h = harness(0);
    let bad = CollectionTarget::new("broken", TargetKind::Product, "not a url");
    let run = h.scheduler.run(&[bad]).await;
    assert_eq!(run.tasks_executed, 1);
    assert_eq!(run.results[0].error_class, Some(ErrorClass::Structural));
    assert!(h.collector.call_order().is_empty());
}

#[tokio::test]
async fn success_without_snapshot_id_counts_as_failure() {
    let h = harness(0);
    h.collector.push(
        "a",
        CaptureOutcome {
            success: true,
            snapshot_id: None,
            error: None,
            duration_ms: 10,
        },
    );
    let run = h.scheduler.run(&[target("a")]).await;
    assert!(!run.results[0].success);
    assert_eq!(run.results[0].error_class, Some(ErrorClass::Structural));
}

#[tokio::test(start_paused = true)]
async fn tasks_are_spaced_by_the_configured_delay() {
    let h = harness(2_000);
    let started = tokio::time::Instant::now();
    let run = h
        .scheduler
        .run(&[target("a"), target("b"), target("c")])
        .await;
    assert_eq!(run.tasks_executed, 3);
    // Pause follows every task, the last one included.
    assert!(started.elapsed() >= std::time::Duration::from_millis(6_000));
}

struct BrokenStore;

#[async_trait::async_trait]
impl SnapshotStore for BrokenStore {
    async fn latest_successful(&self, _target_id: &str) -> anyhow::Result<Option<Snapshot>> {
        Err(anyhow!("connection refused"))
    }
}

#[tokio::test]
async fn store_failure_reports_untriggered_run_with_error() {
    let cfg = ConfigHandle::new(RefreshConfig::default());
    let clock = Arc::new(ManualClock::new(t0()));
    let collector = Arc::new(ScriptedCollector::new());
    let monitor = Arc::new(FailureMonitor::new(
        cfg.clone(),
        clock.clone(),
        Arc::new(RecordingSink::new()),
    ));
    let scheduler = TaskScheduler::new(cfg, clock, Arc::new(BrokenStore), collector.clone(), monitor);

    let run = scheduler.run(&[target("a")]).await;
    assert!(!run.triggered);
    assert_eq!(run.tasks_executed, 0);
    let err = run.error.expect("batch error");
    assert!(err.contains("connection refused"), "{err}");
    assert!(collector.call_order().is_empty());
}

/// Fails lookups for one target; everything else comes from memory.
struct FlakyStore {
    bad: &'static str,
    inner: InMemorySnapshotStore,
}

#[async_trait::async_trait]
impl SnapshotStore for FlakyStore {
    async fn latest_successful(&self, target_id: &str) -> anyhow::Result<Option<Snapshot>> {
        if target_id == self.bad {
            return Err(anyhow!("row for {target_id} corrupt"));
        }
        self.inner.latest_successful(target_id).await
    }
}

#[tokio::test]
async fn one_lookup_failure_schedules_that_target_and_keeps_the_rest() {
    let cfg = ConfigHandle::new(RefreshConfig {
        scheduler: snapshot_refresh::config::SchedulerCfg {
            inter_task_delay_ms: 0,
            ..Default::default()
        },
        ..Default::default()
    });
    let clock = Arc::new(ManualClock::new(t0()));
    let collector = Arc::new(ScriptedCollector::new());
    let monitor = Arc::new(FailureMonitor::new(
        cfg.clone(),
        clock.clone(),
        Arc::new(RecordingSink::new()),
    ));
    let inner = InMemorySnapshotStore::new();
    inner.insert(snap("b", 10));
    inner.insert(snap("c", 1));
    let store = Arc::new(FlakyStore { bad: "a", inner });
    let scheduler = TaskScheduler::new(cfg, clock, store, collector.clone(), monitor);
    let targets = [target("b"), target("a"), target("c")];

    let tasks = scheduler.plan(&targets).await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].target.id, "a");
    assert_eq!(tasks[0].priority, Priority::High);
    assert!(tasks[0].reason.contains("corrupt"), "{}", tasks[0].reason);

    let run = scheduler.run(&targets).await;
    assert!(run.triggered);
    assert!(run.error.is_none());
    assert_eq!(run.tasks_executed, 2);
    assert_eq!(collector.call_order(), vec!["a", "b"]);
}
