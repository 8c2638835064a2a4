//! Demo that runs a few refresh batches against in-memory doubles and prints
//! the per-target report input plus the Prometheus render.

use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics_exporter_prometheus::PrometheusBuilder;
use snapshot_refresh::clock::{Clock, ManualClock};
use snapshot_refresh::config::RefreshConfig;
use snapshot_refresh::error::CollectionError;
use snapshot_refresh::notify::SinkMux;
use snapshot_refresh::target::{InMemorySnapshotStore, ScriptedCollector};
use snapshot_refresh::{CollectionTarget, RefreshContext, Snapshot, TargetKind};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("snapshot_refresh=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let prometheus = PrometheusBuilder::new().install_recorder()?;

    let mut cfg = match RefreshConfig::load_default() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "config load failed; using defaults");
            RefreshConfig::default()
        }
    };
    cfg.scheduler.inter_task_delay_ms = 0;

    let clock = ManualClock::new(Utc::now());
    let store = Arc::new(InMemorySnapshotStore::new());
    let collector = Arc::new(ScriptedCollector::new());

    let now = clock.now();
    store.insert(Snapshot {
        id: "acme-old".into(),
        target_id: "acme".into(),
        created_at: now - Duration::days(20),
        title: Some("Acme Payments".into()),
        description: Some("Card processing for small merchants".into()),
        content: "# Acme Payments\n- Instant payouts\n- Fraud screening\n$29/month".into(),
        capture_success: true,
    });
    store.insert(Snapshot {
        id: "globex-recent".into(),
        target_id: "globex".into(),
        created_at: now - Duration::days(2),
        title: Some("Globex".into()),
        description: None,
        content: String::new(),
        capture_success: true,
    });

    let targets = vec![
        CollectionTarget::new("acme", TargetKind::Competitor, "https://www.acmepay.example/")
            .with_name("Acme Payments"),
        CollectionTarget::new("globex", TargetKind::Product, "https://globex.example/"),
        CollectionTarget::new("initech", TargetKind::Competitor, "https://initech-learn.example/")
            .with_name("Initech Learning"),
    ];
    collector.fail_times("acme", 6, CollectionError::transient("navigation timeout"));
    collector.fail_times("initech", 6, CollectionError::transient("connection reset"));

    let ctx = RefreshContext::builder(cfg, store, collector)
        .clock(Arc::new(clock.clone()))
        .sink(Arc::new(SinkMux::from_env()))
        .build();

    let mut last = None;
    for round in 1..=6 {
        let outcome = ctx.refresh(&targets).await;
        tracing::info!(round, executed = outcome.run.tasks_executed, "refresh round done");
        last = Some(outcome);
        clock.advance(Duration::minutes(2));
    }

    if let Some(outcome) = last {
        println!("{}", serde_json::to_string_pretty(&outcome.inputs)?);
    }
    println!("{}", serde_json::to_string_pretty(&ctx.stats.collect())?);
    println!("{}", prometheus.render());
    Ok(())
}
