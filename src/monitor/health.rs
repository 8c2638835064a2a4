// src/monitor/health.rs
//! System health derived from recent outcomes and active alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const CRITICAL_SUCCESS_RATE: f64 = 0.50;
const DEGRADED_SUCCESS_RATE: f64 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealth {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthMetrics {
    pub overall_health: SystemHealth,
    /// Successes / (successes + failures) inside the window; 1.0 with no samples.
    pub success_rate: f64,
    pub recent_successes: usize,
    pub recent_failures: usize,
    pub active_alerts: usize,
    pub critical_alerts: usize,
    pub warning_alerts: usize,
    pub info_alerts: usize,
    pub computed_at: DateTime<Utc>,
}

pub fn success_rate(successes: usize, failures: usize) -> f64 {
    let total = successes + failures;
    if total == 0 {
        1.0
    } else {
        successes as f64 / total as f64
    }
}

pub fn classify(critical_alerts: usize, warning_alerts: usize, success_rate: f64) -> SystemHealth {
    if critical_alerts > 0 || success_rate < CRITICAL_SUCCESS_RATE {
        SystemHealth::Critical
    } else if warning_alerts > 0 || success_rate < DEGRADED_SUCCESS_RATE {
        SystemHealth::Degraded
    } else {
        SystemHealth::Healthy
    }
}
