// src/monitor/alert.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CollectionError, ErrorClass};

/// Alert severity. Declaration order is escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    /// Severity implied by a failure count alone.
    pub fn for_count(count: u32, warning_threshold: u32, critical_threshold: u32) -> Self {
        if count >= critical_threshold {
            Severity::Critical
        } else if count >= warning_threshold {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlertKey {
    pub operation: String,
    pub target_id: String,
}

impl AlertKey {
    pub fn new(operation: &str, target_id: &str) -> Self {
        Self {
            operation: operation.to_string(),
            target_id: target_id.to_string(),
        }
    }
}

/// Context passed alongside a failure or success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationContext {
    pub target_id: String,
    pub correlation_id: Option<String>,
}

impl OperationContext {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Aggregated failures for one `(operation, target)` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAlert {
    pub id: String,
    pub operation_type: String,
    pub target_id: String,
    pub count: u32,
    pub first_occurrence: DateTime<Utc>,
    pub last_occurrence: DateTime<Utc>,
    pub severity: Severity,
    pub resolved: bool,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolution_reason: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub error_message: String,
    pub last_error_class: ErrorClass,
}

impl FailureAlert {
    pub(crate) fn open(
        key: &AlertKey,
        error: &CollectionError,
        ctx: &OperationContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation_type: key.operation.clone(),
            target_id: key.target_id.clone(),
            count: 1,
            first_occurrence: now,
            last_occurrence: now,
            severity: Severity::Info,
            resolved: false,
            resolved_at: None,
            resolution_reason: None,
            correlation_id: ctx.correlation_id.clone(),
            error_message: error.to_string(),
            last_error_class: error.class(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.resolved
    }

    pub(crate) fn resolve(&mut self, reason: &str, now: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_at = Some(now);
        self.resolution_reason = Some(reason.to_string());
    }
}

/// What the fallback selector needs to know about recent failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureContext {
    pub operation_type: String,
    pub failure_count: u32,
    pub last_failure_time: DateTime<Utc>,
    /// No success has resolved the streak yet.
    pub unresolved: bool,
}

impl From<&FailureAlert> for FailureContext {
    fn from(a: &FailureAlert) -> Self {
        Self {
            operation_type: a.operation_type.clone(),
            failure_count: a.count,
            last_failure_time: a.last_occurrence,
            unresolved: !a.resolved,
        }
    }
}
