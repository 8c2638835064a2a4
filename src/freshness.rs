//! # Freshness Evaluator
//! Pure decision: does a target need a new capture, and how urgently?
//!
//! Priority depends only on the age of the latest successful snapshot.
//! Exactly-at-threshold ages count as fresh (inclusive `<=`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FreshnessPolicy;
use crate::target::{CollectionTarget, Snapshot};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Execution priority. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessDecision {
    pub required: bool,
    pub priority: Priority,
    pub reason: String,
    /// `None` when no snapshot exists.
    pub age_days: Option<f64>,
}

/// Snapshot age in fractional days. Future timestamps count as age 0.
pub fn age_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let ms = now.signed_duration_since(created_at).num_milliseconds().max(0);
    ms as f64 / MS_PER_DAY
}

pub fn evaluate(
    target: &CollectionTarget,
    latest: Option<&Snapshot>,
    policy: &FreshnessPolicy,
    now: DateTime<Utc>,
) -> FreshnessDecision {
    let Some(snapshot) = latest else {
        return FreshnessDecision {
            required: true,
            priority: Priority::High,
            reason: "no snapshot".to_string(),
            age_days: None,
        };
    };
    let age = age_days(snapshot.created_at, now);
    tracing::trace!(target: "freshness", target_id = %target.id, snapshot_id = %snapshot.id, age, "evaluated");
    decide_for_age(age, policy)
}

/// Threshold logic on a known age.
pub fn decide_for_age(age: f64, policy: &FreshnessPolicy) -> FreshnessDecision {
    if age > policy.high_priority_threshold_days {
        FreshnessDecision {
            required: true,
            priority: Priority::High,
            reason: format!(
                "snapshot is {age:.2} days old (> {} day high-priority threshold)",
                policy.high_priority_threshold_days
            ),
            age_days: Some(age),
        }
    } else if age > policy.freshness_threshold_days {
        FreshnessDecision {
            required: true,
            priority: Priority::Medium,
            reason: format!(
                "snapshot is {age:.2} days old (> {} day freshness threshold)",
                policy.freshness_threshold_days
            ),
            age_days: Some(age),
        }
    } else {
        FreshnessDecision {
            required: false,
            priority: Priority::Low,
            reason: format!("snapshot is fresh ({age:.2} days old)"),
            age_days: Some(age),
        }
    }
}
