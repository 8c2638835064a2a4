// tests/fallback_selection.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use snapshot_refresh::clock::ManualClock;
use snapshot_refresh::config::FallbackCfg;
use snapshot_refresh::fallback::{
    Confidence, FallbackOutcome, FallbackService, FallbackSource, FallbackSources,
    InMemoryManualStore, ManualOverride, PatternDeriver, SourceDetails, StrategyKind,
    StrategyRegistry,
};
use snapshot_refresh::monitor::FailureContext;
use snapshot_refresh::target::InMemorySnapshotStore;
use snapshot_refresh::{CollectionTarget, Snapshot, SnapshotStore, TargetKind};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 12, 10, 0, 0).unwrap()
}

fn ctx(count: u32, minutes_ago: i64) -> FailureContext {
    FailureContext {
        operation_type: "snapshot_capture".into(),
        failure_count: count,
        last_failure_time: now() - Duration::minutes(minutes_ago),
        unresolved: true,
    }
}

fn acme() -> CollectionTarget {
    CollectionTarget::new("acme", TargetKind::Competitor, "https://www.acmepay.example/")
        .with_name("Acme Pay")
}

struct Fixture {
    service: FallbackService,
    store: Arc<InMemorySnapshotStore>,
    manual: Arc<InMemoryManualStore>,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemorySnapshotStore::new());
    let manual = Arc::new(InMemoryManualStore::new());
    let sources = FallbackSources {
        snapshots: store.clone(),
        manual: manual.clone(),
        deriver: Some(Arc::new(PatternDeriver)),
    };
    let service = FallbackService::new(
        Arc::new(StrategyRegistry::from_config(&FallbackCfg::default())),
        sources,
        Arc::new(ManualClock::new(now())),
        100,
    );
    Fixture {
        service,
        store,
        manual,
    }
}

fn cached_snapshot() -> Snapshot {
    Snapshot {
        id: "acme-aug".into(),
        target_id: "acme".into(),
        created_at: now() - Duration::days(20),
        title: Some("Acme Pay | Payments for merchants".into()),
        description: Some("Accept cards online and in person.".into()),
        content: "- Instant payouts\n- Fraud screening\nPlans from $29/month".into(),
        capture_success: true,
    }
}

#[tokio::test]
async fn cached_wins_when_a_snapshot_exists() {
    let f = fixture();
    f.store.insert(cached_snapshot());

    let s = f.service.select_strategy(&acme(), &ctx(5, 30)).await.unwrap();
    assert_eq!(s.kind, StrategyKind::CachedContent);

    let content = f
        .service
        .execute_strategy(&s, &acme(), Some("run-1"))
        .await
        .expect("cached content");
    assert_eq!(content.title, "Acme Pay | Payments for merchants");
    assert_eq!(content.description, "Accept cards online and in person.");
    assert_eq!(content.source(), FallbackSource::Cached);
    assert_eq!(content.confidence(), Confidence::Medium);
    match &content.metadata.details {
        SourceDetails::Cached {
            snapshot_id,
            staleness_days,
            ..
        } => {
            assert_eq!(snapshot_id, "acme-aug");
            assert!((*staleness_days - 20.0).abs() < 1e-9);
        }
        other => panic!("unexpected details: {other:?}"),
    }
}

#[tokio::test]
async fn without_snapshot_five_failures_fall_to_template() {
    let f = fixture();
    let s = f.service.select_strategy(&acme(), &ctx(5, 30)).await.unwrap();
    assert_eq!(s.kind, StrategyKind::TemplateContent);

    let content = f.service.execute_strategy(&s, &acme(), None).await.unwrap();
    assert_eq!(content.confidence(), Confidence::Low);
    assert_eq!(content.title, "Acme Pay");
    match &content.metadata.details {
        SourceDetails::Template { industry, .. } => assert_eq!(industry, "fintech"),
        other => panic!("unexpected details: {other:?}"),
    }
}

#[tokio::test]
async fn without_snapshot_three_failures_give_nothing() {
    let f = fixture();
    assert!(f.service.select_strategy(&acme(), &ctx(3, 30)).await.is_none());
    match f.service.degrade(&acme(), &ctx(3, 30), None).await {
        FallbackOutcome::Unavailable { reason } => assert!(reason.contains('3'), "{reason}"),
        other => panic!("expected unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn too_few_failures_or_too_old_are_ineligible() {
    let f = fixture();
    f.store.insert(cached_snapshot());
    assert!(f.service.select_strategy(&acme(), &ctx(2, 1)).await.is_none());
    // Cached window is 1h; template needs 5 failures.
    assert!(f.service.select_strategy(&acme(), &ctx(4, 90)).await.is_none());
    // Template window is 2h.
    let s = f.service.select_strategy(&acme(), &ctx(6, 90)).await.unwrap();
    assert_eq!(s.kind, StrategyKind::TemplateContent);
}

#[tokio::test]
async fn manual_override_needs_a_record_and_ten_failures() {
    let f = fixture();
    f.manual.upsert(ManualOverride {
        target_id: "acme".into(),
        title: "Acme Pay (curated)".into(),
        description: "Operator-written summary.".into(),
        key_features: vec!["Payouts".into()],
        pricing_note: None,
        curated_by: "ops".into(),
        updated_at: now() - Duration::days(1),
    });
    // Failure 10h ago: only the 24h manual window still covers it.
    let s = f.service.select_strategy(&acme(), &ctx(12, 600)).await.unwrap();
    assert_eq!(s.kind, StrategyKind::ManualOverride);

    let content = f.service.execute_strategy(&s, &acme(), None).await.unwrap();
    assert_eq!(content.confidence(), Confidence::High);
    assert_eq!(content.source(), FallbackSource::Manual);
}

#[tokio::test]
async fn disabled_strategies_are_skipped() {
    let f = fixture();
    f.store.insert(cached_snapshot());
    f.service
        .registry()
        .set_enabled(StrategyKind::CachedContent, false);
    let s = f.service.select_strategy(&acme(), &ctx(5, 10)).await.unwrap();
    assert_eq!(s.kind, StrategyKind::TemplateContent);
}

#[tokio::test]
async fn derived_content_only_when_enabled_and_derivable() {
    let f = fixture();
    f.store.insert(cached_snapshot());
    let registry = f.service.registry();
    registry.set_enabled(StrategyKind::CachedContent, false);
    registry.set_enabled(StrategyKind::TemplateContent, false);

    // Still disabled by default.
    assert!(f.service.select_strategy(&acme(), &ctx(3, 10)).await.is_none());

    registry.set_enabled(StrategyKind::DerivedContent, true);
    let s = f.service.select_strategy(&acme(), &ctx(3, 10)).await.unwrap();
    assert_eq!(s.kind, StrategyKind::DerivedContent);

    // Consecutive-failure requirement.
    let mut resolved = ctx(3, 10);
    resolved.unresolved = false;
    assert!(f.service.select_strategy(&acme(), &resolved).await.is_none());
}

#[tokio::test]
async fn executions_are_audited() {
    let f = fixture();
    f.store.insert(cached_snapshot());
    let out = f.service.degrade(&acme(), &ctx(5, 5), Some("run-9")).await;
    assert!(matches!(
        out,
        FallbackOutcome::Content {
            strategy: StrategyKind::CachedContent,
            ..
        }
    ));

    let audit = f.service.executor().executions();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].success);
    assert_eq!(audit[0].correlation_id.as_deref(), Some("run-9"));

    let stats = f.service.stats();
    assert_eq!(stats.total_executions, 1);
    assert_eq!(stats.successful_executions, 1);
    assert_eq!(stats.by_strategy["cached-content"].attempts, 1);
}

struct OfflineStore;

#[async_trait::async_trait]
impl SnapshotStore for OfflineStore {
    async fn latest_successful(&self, _target_id: &str) -> anyhow::Result<Option<Snapshot>> {
        Err(anyhow::anyhow!("snapshot db offline"))
    }
}

#[tokio::test]
async fn store_errors_are_audited_apart_from_empty_results() {
    let service = FallbackService::new(
        Arc::new(StrategyRegistry::default()),
        FallbackSources {
            snapshots: Arc::new(OfflineStore),
            manual: Arc::new(InMemoryManualStore::new()),
            deriver: None,
        },
        Arc::new(ManualClock::new(now())),
        10,
    );
    let cached = service
        .registry()
        .get(StrategyKind::CachedContent)
        .unwrap();
    assert!(service.execute_strategy(&cached, &acme(), None).await.is_none());

    let empty = fixture();
    assert!(empty
        .service
        .execute_strategy(&cached, &acme(), None)
        .await
        .is_none());

    let audit = service.executor().executions();
    let failed = &audit[0];
    assert!(!failed.success);
    assert!(
        failed
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("snapshot db offline")),
        "{failed:?}"
    );
    let empty_audit = empty.service.executor().executions();
    assert_eq!(empty_audit[0].error_message.as_deref(), Some("strategy produced no content"));
}
