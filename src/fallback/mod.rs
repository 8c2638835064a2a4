// src/fallback/mod.rs
//! # Fallback
//! Degraded-content strategies for targets whose live collection keeps failing.
//!
//! Strategies are tried in `priority_rank` order; the first one that is
//! enabled, eligible for the failure context, and applicable to the target
//! wins. Every produced [`FallbackContent`] carries an explicit source and
//! confidence so the report can flag it.

pub mod content;
pub mod derive;
pub mod executor;
pub mod manual;
pub mod selector;
pub mod strategy;
pub mod templates;

use serde::Serialize;
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::monitor::FailureContext;
use crate::target::{CollectionTarget, SnapshotStore};

pub use content::{Confidence, FallbackContent, FallbackExecution, FallbackMetadata, FallbackSource, SourceDetails};
pub use derive::{ContentDeriver, PatternDeriver};
pub use executor::{FallbackExecutor, FallbackStats, StrategyStats};
pub use manual::{InMemoryManualStore, ManualOverride, ManualOverrideStore};
pub use selector::FallbackSelector;
pub use strategy::{Eligibility, FallbackStrategy, StrategyKind, StrategyRegistry};

/// Data the strategies draw from.
#[derive(Clone)]
pub struct FallbackSources {
    pub snapshots: Arc<dyn SnapshotStore>,
    pub manual: Arc<dyn ManualOverrideStore>,
    /// Content-generation capability; derived-content is inapplicable without it.
    pub deriver: Option<Arc<dyn ContentDeriver>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FallbackOutcome {
    Content {
        strategy: StrategyKind,
        content: FallbackContent,
    },
    Unavailable {
        reason: String,
    },
}

/// Selector + executor behind one call.
pub struct FallbackService {
    registry: Arc<StrategyRegistry>,
    selector: FallbackSelector,
    executor: FallbackExecutor,
}

impl FallbackService {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        sources: FallbackSources,
        clock: SharedClock,
        audit_capacity: usize,
    ) -> Self {
        Self {
            selector: FallbackSelector::new(registry.clone(), sources.clone(), clock.clone()),
            executor: FallbackExecutor::new(sources, clock, audit_capacity),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    pub fn selector(&self) -> &FallbackSelector {
        &self.selector
    }

    pub fn executor(&self) -> &FallbackExecutor {
        &self.executor
    }

    pub async fn select_strategy(
        &self,
        target: &CollectionTarget,
        ctx: &FailureContext,
    ) -> Option<FallbackStrategy> {
        self.selector.select_strategy(target, ctx).await
    }

    pub async fn execute_strategy(
        &self,
        strategy: &FallbackStrategy,
        target: &CollectionTarget,
        correlation_id: Option<&str>,
    ) -> Option<FallbackContent> {
        self.executor
            .execute_strategy(strategy, target, correlation_id)
            .await
    }

    /// Select and execute. An empty execution is reported as unavailable;
    /// later strategies are not tried.
    pub async fn degrade(
        &self,
        target: &CollectionTarget,
        ctx: &FailureContext,
        correlation_id: Option<&str>,
    ) -> FallbackOutcome {
        let Some(strategy) = self.select_strategy(target, ctx).await else {
            return FallbackOutcome::Unavailable {
                reason: format!(
                    "no fallback strategy eligible after {} failure(s)",
                    ctx.failure_count
                ),
            };
        };
        match self.execute_strategy(&strategy, target, correlation_id).await {
            Some(content) => FallbackOutcome::Content {
                strategy: strategy.kind,
                content,
            },
            None => FallbackOutcome::Unavailable {
                reason: format!("{} produced no content", strategy.id()),
            },
        }
    }

    pub fn stats(&self) -> FallbackStats {
        self.executor.stats()
    }
}
