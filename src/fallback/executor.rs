// src/fallback/executor.rs
//! Runs a selected strategy and keeps an audit trail of every attempt.

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use tracing::{info, warn};

use super::content::{Confidence, FallbackContent, FallbackExecution, FallbackMetadata, SourceDetails};
use super::derive::{extract_features, extract_price};
use super::strategy::{FallbackStrategy, StrategyKind};
use super::templates;
use super::FallbackSources;
use crate::clock::SharedClock;
use crate::freshness::age_days;
use crate::target::CollectionTarget;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StrategyStats {
    pub attempts: usize,
    pub successes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FallbackStats {
    pub total_executions: usize,
    pub successful_executions: usize,
    /// Successful / total; 0.0 with no executions.
    pub success_rate: f64,
    pub by_strategy: BTreeMap<String, StrategyStats>,
    #[serde(default)]
    pub last_execution_at: Option<DateTime<Utc>>,
}

pub struct FallbackExecutor {
    sources: FallbackSources,
    clock: SharedClock,
    audit: Mutex<VecDeque<FallbackExecution>>,
    capacity: usize,
}

impl FallbackExecutor {
    pub fn new(sources: FallbackSources, clock: SharedClock, capacity: usize) -> Self {
        Self {
            sources,
            clock,
            audit: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Produce substitute content. `None` means "no fallback available";
    /// errors are logged and never escape. Every attempt is audited.
    pub async fn execute_strategy(
        &self,
        strategy: &FallbackStrategy,
        target: &CollectionTarget,
        correlation_id: Option<&str>,
    ) -> Option<FallbackContent> {
        let result = self.produce(strategy.kind, target).await;
        let (content, error_message, outcome) = match result {
            Ok(Some(c)) => (Some(c), None, "success"),
            Ok(None) => (None, Some("strategy produced no content".to_string()), "empty"),
            Err(e) => {
                let msg = format!("{e:#}");
                warn!(target: "fallback", target_id = %target.id, strategy = strategy.id(), error = %msg, "fallback execution failed");
                (None, Some(msg), "error")
            }
        };

        let success = content.is_some();
        self.record(FallbackExecution {
            strategy_id: strategy.kind,
            target_id: target.id.clone(),
            executed_at: self.clock.now(),
            success,
            correlation_id: correlation_id.map(str::to_string),
            error_message,
        });
        counter!(
            "refresh_fallback_executions_total",
            "strategy" => strategy.id(),
            "outcome" => outcome
        )
        .increment(1);
        if success {
            info!(target: "fallback", target_id = %target.id, strategy = strategy.id(), "fallback content produced");
        }
        content
    }

    fn record(&self, exec: FallbackExecution) {
        let mut audit = self.audit.lock();
        audit.push_back(exec);
        while audit.len() > self.capacity {
            audit.pop_front();
        }
    }

    pub fn executions(&self) -> Vec<FallbackExecution> {
        self.audit.lock().iter().cloned().collect()
    }

    pub fn stats(&self) -> FallbackStats {
        let audit = self.audit.lock();
        let mut stats = FallbackStats::default();
        for e in audit.iter() {
            stats.total_executions += 1;
            let entry = stats
                .by_strategy
                .entry(e.strategy_id.id().to_string())
                .or_default();
            entry.attempts += 1;
            if e.success {
                entry.successes += 1;
                stats.successful_executions += 1;
            }
            stats.last_execution_at = stats.last_execution_at.max(Some(e.executed_at));
        }
        if stats.total_executions > 0 {
            stats.success_rate =
                stats.successful_executions as f64 / stats.total_executions as f64;
        }
        stats
    }

    async fn produce(&self, kind: StrategyKind, target: &CollectionTarget) -> Result<Option<FallbackContent>> {
        let now = self.clock.now();
        match kind {
            StrategyKind::CachedContent => {
                let Some(snap) = self.sources.snapshots.latest_successful(&target.id).await? else {
                    return Ok(None);
                };
                let age = age_days(snap.created_at, now);
                let taken = snap.created_at.format("%Y-%m-%d");
                Ok(Some(FallbackContent {
                    title: snap.title.clone().unwrap_or_else(|| target.name.clone()),
                    description: snap.description.clone().unwrap_or_default(),
                    key_features: extract_features(&snap.content, 6),
                    pricing_note: extract_price(&snap.content)
                        .map(|p| format!("{p} (as of {taken})"))
                        .unwrap_or_else(|| format!("Pricing not captured in snapshot from {taken}")),
                    status_note: format!("Live capture failing; showing cached snapshot from {taken}"),
                    metadata: FallbackMetadata {
                        details: SourceDetails::Cached {
                            snapshot_id: snap.id.clone(),
                            captured_at: snap.created_at,
                            staleness_days: age,
                        },
                        confidence: Confidence::Medium,
                        last_updated: snap.created_at,
                        notes: format!("cached snapshot is {age:.1} days old"),
                    },
                }))
            }
            StrategyKind::TemplateContent => {
                let industry = templates::infer_industry(target, None);
                let tpl = templates::template_for(industry);
                Ok(Some(FallbackContent {
                    title: target.name.clone(),
                    description: format!(
                        "{} operates in the {} space. Detailed information is temporarily unavailable.",
                        target.name, tpl.label
                    ),
                    key_features: tpl.features.iter().map(|s| s.to_string()).collect(),
                    pricing_note: tpl.pricing_hint.to_string(),
                    status_note: "Live data unavailable; generic industry template shown".to_string(),
                    metadata: FallbackMetadata {
                        details: SourceDetails::Template {
                            industry: industry.to_string(),
                            template_id: format!("{industry}-v1"),
                        },
                        confidence: Confidence::Low,
                        last_updated: now,
                        notes: format!("industry inferred as `{industry}` from host and name"),
                    },
                }))
            }
            StrategyKind::ManualOverride => {
                let Some(rec) = self.sources.manual.get(&target.id).await? else {
                    return Ok(None);
                };
                Ok(Some(FallbackContent {
                    title: rec.title,
                    description: rec.description,
                    key_features: rec.key_features,
                    pricing_note: rec
                        .pricing_note
                        .unwrap_or_else(|| "Pricing not provided by operator".to_string()),
                    status_note: "Live data unavailable; operator-curated content shown".to_string(),
                    metadata: FallbackMetadata {
                        details: SourceDetails::Manual {
                            curated_by: rec.curated_by,
                            curated_at: rec.updated_at,
                        },
                        confidence: Confidence::High,
                        last_updated: rec.updated_at,
                        notes: "manual override".to_string(),
                    },
                }))
            }
            StrategyKind::DerivedContent => {
                let Some(deriver) = &self.sources.deriver else {
                    return Ok(None);
                };
                let latest = self.sources.snapshots.latest_successful(&target.id).await?;
                let Some(d) = deriver.derive(target, latest.as_ref()) else {
                    return Ok(None);
                };
                Ok(Some(FallbackContent {
                    title: d.title,
                    description: d.description,
                    key_features: d.key_features,
                    pricing_note: d
                        .pricing_note
                        .unwrap_or_else(|| "Pricing could not be inferred".to_string()),
                    status_note: "Live data unavailable; content inferred from patterns".to_string(),
                    metadata: FallbackMetadata {
                        notes: format!("derived from {} signal(s)", d.signals.len()),
                        details: SourceDetails::Derived {
                            signals: d.signals,
                            based_on_snapshot: latest.map(|s| s.id),
                        },
                        confidence: Confidence::Medium,
                        last_updated: now,
                    },
                }))
            }
        }
    }
}
