// tests/health_loop.rs
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use snapshot_refresh::clock::ManualClock;
use snapshot_refresh::error::CollectionError;
use snapshot_refresh::monitor::OperationContext;
use snapshot_refresh::notify::{RecordingSink, EVENT_HEALTH_SNAPSHOT};
use snapshot_refresh::stats::run_health_check;
use snapshot_refresh::target::{InMemorySnapshotStore, ScriptedCollector};
use snapshot_refresh::{RefreshConfig, RefreshContext, SystemHealth};

fn context(interval_secs: u64) -> (RefreshContext, ManualClock, Arc<RecordingSink>) {
    let mut cfg = RefreshConfig::default();
    cfg.scheduler.inter_task_delay_ms = 0;
    cfg.monitor.health_check_interval_secs = interval_secs;
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 9, 20, 0, 0, 0).unwrap());
    let sink = Arc::new(RecordingSink::new());
    let ctx = RefreshContext::builder(
        cfg,
        Arc::new(InMemorySnapshotStore::new()),
        Arc::new(ScriptedCollector::new()),
    )
    .clock(Arc::new(clock.clone()))
    .sink(sink.clone())
    .build();
    (ctx, clock, sink)
}

#[tokio::test(start_paused = true)]
async fn loop_ticks_on_interval_and_stops_cleanly() {
    let (ctx, _clock, sink) = context(60);
    let handle = ctx.spawn_health_check();
    assert!(handle.is_running());

    // First tick fires immediately, second at 60s.
    tokio::time::sleep(StdDuration::from_secs(90)).await;
    assert_eq!(sink.count(EVENT_HEALTH_SNAPSHOT), 2);

    handle.stop().await;
    tokio::time::sleep(StdDuration::from_secs(600)).await;
    assert_eq!(sink.count(EVENT_HEALTH_SNAPSHOT), 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_ends_the_loop() {
    let (ctx, _clock, sink) = context(30);
    let handle = ctx.spawn_health_check();
    tokio::time::sleep(StdDuration::from_secs(1)).await;
    let seen = sink.count(EVENT_HEALTH_SNAPSHOT);
    assert_eq!(seen, 1);

    drop(handle);
    tokio::time::sleep(StdDuration::from_secs(300)).await;
    assert_eq!(sink.count(EVENT_HEALTH_SNAPSHOT), seen);
}

#[tokio::test]
async fn health_tick_reports_and_purges_old_resolved_alerts() {
    let (ctx, clock, sink) = context(60);
    let op = "snapshot_capture";
    let octx = OperationContext::new("acme");
    for _ in 0..10 {
        ctx.monitor
            .record_failure(op, &CollectionError::transient("timeout"), &octx)
            .await;
    }

    let report = run_health_check(&ctx.stats, sink.as_ref(), &ctx.config).await;
    assert_eq!(report.health.critical_alerts, 1);
    assert_eq!(report.health.overall_health, SystemHealth::Critical);
    let (_, payload) = sink.events.lock().last().cloned().unwrap();
    assert_eq!(payload["health"]["critical_alerts"], 1);

    clock.advance(Duration::minutes(20));
    assert!(ctx.monitor.record_success(op, &octx).await);
    clock.advance(Duration::hours(25));

    let report = run_health_check(&ctx.stats, sink.as_ref(), &ctx.config).await;
    assert_eq!(report.health.active_alerts, 0);
    assert!(ctx.monitor.all_alerts().is_empty());
    // Outcomes older than the window no longer count.
    assert_eq!(report.health.success_rate, 1.0);
    assert_eq!(report.health.overall_health, SystemHealth::Healthy);
}
