// src/fallback/selector.rs
use std::sync::Arc;
use tracing::{debug, warn};

use super::strategy::{FallbackStrategy, StrategyKind, StrategyRegistry};
use super::FallbackSources;
use crate::clock::SharedClock;
use crate::monitor::FailureContext;
use crate::target::CollectionTarget;

/// Picks the best eligible and applicable strategy. Returns `None` rather
/// than inventing a default when nothing qualifies.
pub struct FallbackSelector {
    registry: Arc<StrategyRegistry>,
    sources: FallbackSources,
    clock: SharedClock,
}

impl FallbackSelector {
    pub fn new(registry: Arc<StrategyRegistry>, sources: FallbackSources, clock: SharedClock) -> Self {
        Self {
            registry,
            sources,
            clock,
        }
    }

    pub async fn select_strategy(
        &self,
        target: &CollectionTarget,
        ctx: &FailureContext,
    ) -> Option<FallbackStrategy> {
        let now = self.clock.now();
        // `strategies()` is already in ascending priority_rank.
        let eligible: Vec<FallbackStrategy> = self
            .registry
            .strategies()
            .into_iter()
            .filter(|s| s.is_eligible(ctx, now))
            .collect();

        for strategy in eligible {
            if self.is_applicable(&strategy, target).await {
                debug!(target: "fallback", target_id = %target.id, strategy = strategy.id(), "strategy selected");
                return Some(strategy);
            }
        }
        debug!(
            target: "fallback",
            target_id = %target.id,
            failures = ctx.failure_count,
            "no fallback strategy available"
        );
        None
    }

    /// Whether the strategy can produce content for this target at all.
    /// Lookup errors count as "not applicable".
    pub async fn is_applicable(&self, strategy: &FallbackStrategy, target: &CollectionTarget) -> bool {
        match strategy.kind {
            StrategyKind::CachedContent => match self.sources.snapshots.latest_successful(&target.id).await {
                Ok(s) => s.is_some(),
                Err(e) => {
                    warn!(target: "fallback", target_id = %target.id, error = %format!("{e:#}"), "snapshot lookup failed");
                    false
                }
            },
            StrategyKind::TemplateContent => true,
            StrategyKind::ManualOverride => match self.sources.manual.get(&target.id).await {
                Ok(r) => r.is_some(),
                Err(e) => {
                    warn!(target: "fallback", target_id = %target.id, error = %format!("{e:#}"), "manual override lookup failed");
                    false
                }
            },
            StrategyKind::DerivedContent => {
                let Some(deriver) = &self.sources.deriver else {
                    return false;
                };
                let latest = self
                    .sources
                    .snapshots
                    .latest_successful(&target.id)
                    .await
                    .ok()
                    .flatten();
                deriver.can_derive(target, latest.as_ref())
            }
        }
    }
}
