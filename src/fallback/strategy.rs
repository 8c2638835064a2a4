// src/fallback/strategy.rs
//! Strategy descriptors (fixed, ordered) and their mutable settings.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::{ConfigHandle, FallbackCfg, StrategyOverride};
use crate::monitor::FailureContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    CachedContent,
    TemplateContent,
    ManualOverride,
    DerivedContent,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::CachedContent,
        StrategyKind::TemplateContent,
        StrategyKind::ManualOverride,
        StrategyKind::DerivedContent,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            StrategyKind::CachedContent => "cached-content",
            StrategyKind::TemplateContent => "template-content",
            StrategyKind::ManualOverride => "manual-override",
            StrategyKind::DerivedContent => "derived-content",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub min_failure_count: u32,
    pub time_window_ms: u64,
    /// Require an unbroken streak (no resolving success yet).
    pub consecutive_failures: bool,
}

impl Eligibility {
    pub fn time_window(&self) -> Duration {
        i64::try_from(self.time_window_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .unwrap_or(Duration::MAX)
    }
}

/// Resolved view of a strategy: fixed descriptor plus current settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackStrategy {
    pub kind: StrategyKind,
    pub priority_rank: u8,
    pub enabled: bool,
    pub eligibility: Eligibility,
}

impl FallbackStrategy {
    pub fn id(&self) -> &'static str {
        self.kind.id()
    }

    /// Enabled, enough failures, and the last one recent enough.
    pub fn is_eligible(&self, ctx: &FailureContext, now: DateTime<Utc>) -> bool {
        self.enabled
            && ctx.failure_count >= self.eligibility.min_failure_count
            && now.signed_duration_since(ctx.last_failure_time) <= self.eligibility.time_window()
            && (!self.eligibility.consecutive_failures || ctx.unresolved)
    }

    fn overlay(&mut self, o: &StrategyOverride) {
        if let Some(v) = o.enabled {
            self.enabled = v;
        }
        if let Some(v) = o.min_failure_count {
            self.eligibility.min_failure_count = v;
        }
        if let Some(v) = o.time_window_ms {
            self.eligibility.time_window_ms = v;
        }
        if let Some(v) = o.consecutive_failures {
            self.eligibility.consecutive_failures = v;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Descriptor {
    kind: StrategyKind,
    priority_rank: u8,
    enabled: bool,
    eligibility: Eligibility,
}

const HOUR_MS: u64 = 3_600_000;

const DESCRIPTORS: [Descriptor; 4] = [
    Descriptor {
        kind: StrategyKind::CachedContent,
        priority_rank: 1,
        enabled: true,
        eligibility: Eligibility {
            min_failure_count: 3,
            time_window_ms: HOUR_MS,
            consecutive_failures: false,
        },
    },
    Descriptor {
        kind: StrategyKind::TemplateContent,
        priority_rank: 2,
        enabled: true,
        eligibility: Eligibility {
            min_failure_count: 5,
            time_window_ms: 2 * HOUR_MS,
            consecutive_failures: false,
        },
    },
    Descriptor {
        kind: StrategyKind::ManualOverride,
        priority_rank: 3,
        enabled: true,
        eligibility: Eligibility {
            min_failure_count: 10,
            time_window_ms: 24 * HOUR_MS,
            consecutive_failures: false,
        },
    },
    // Experimental; off unless configured.
    Descriptor {
        kind: StrategyKind::DerivedContent,
        priority_rank: 4,
        enabled: false,
        eligibility: Eligibility {
            min_failure_count: 3,
            time_window_ms: 6 * HOUR_MS,
            consecutive_failures: true,
        },
    },
];

/// Where config overrides come from: a fixed copy, or the live handle so
/// hot-reloaded eligibility applies on the next selection.
#[derive(Clone)]
enum OverrideSource {
    Fixed(FallbackCfg),
    Live(ConfigHandle),
}

impl OverrideSource {
    fn strategies(&self) -> BTreeMap<String, StrategyOverride> {
        match self {
            OverrideSource::Fixed(cfg) => cfg.strategies.clone(),
            OverrideSource::Live(handle) => handle.fallback().strategies,
        }
    }
}

/// Fixed descriptors plus a separate mutable settings store.
///
/// Every read starts from the descriptors, then layers config overrides and
/// finally runtime toggles, so removing an override reverts to the default.
pub struct StrategyRegistry {
    source: OverrideSource,
    runtime: RwLock<HashMap<StrategyKind, StrategyOverride>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::from_config(&FallbackCfg::default())
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.strategies())
            .finish()
    }
}

impl StrategyRegistry {
    /// Overrides frozen at construction.
    pub fn from_config(cfg: &FallbackCfg) -> Self {
        warn_unknown_ids(&cfg.strategies);
        Self {
            source: OverrideSource::Fixed(cfg.clone()),
            runtime: RwLock::new(HashMap::new()),
        }
    }

    /// Overrides read from `handle` on every lookup.
    pub fn live(handle: ConfigHandle) -> Self {
        warn_unknown_ids(&handle.fallback().strategies);
        Self {
            source: OverrideSource::Live(handle),
            runtime: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_enabled(&self, kind: StrategyKind, enabled: bool) {
        self.runtime.write().entry(kind).or_default().enabled = Some(enabled);
    }

    pub fn set_eligibility(&self, kind: StrategyKind, eligibility: Eligibility) {
        let mut runtime = self.runtime.write();
        let o = runtime.entry(kind).or_default();
        o.min_failure_count = Some(eligibility.min_failure_count);
        o.time_window_ms = Some(eligibility.time_window_ms);
        o.consecutive_failures = Some(eligibility.consecutive_failures);
    }

    pub fn get(&self, kind: StrategyKind) -> Option<FallbackStrategy> {
        self.strategies().into_iter().find(|s| s.kind == kind)
    }

    /// All strategies in ascending `priority_rank`.
    pub fn strategies(&self) -> Vec<FallbackStrategy> {
        let configured = self.source.strategies();
        let runtime = self.runtime.read();
        let mut out: Vec<FallbackStrategy> = DESCRIPTORS
            .iter()
            .map(|d| {
                let mut s = FallbackStrategy {
                    kind: d.kind,
                    priority_rank: d.priority_rank,
                    enabled: d.enabled,
                    eligibility: d.eligibility,
                };
                if let Some(o) = configured.get(d.kind.id()) {
                    s.overlay(o);
                }
                if let Some(o) = runtime.get(&d.kind) {
                    s.overlay(o);
                }
                s
            })
            .collect();
        out.sort_by_key(|s| s.priority_rank);
        out
    }
}

fn warn_unknown_ids(strategies: &BTreeMap<String, StrategyOverride>) {
    for id in strategies.keys() {
        if StrategyKind::from_id(id).is_none() {
            tracing::warn!(target: "fallback", strategy = %id, "unknown strategy in config");
        }
    }
}
