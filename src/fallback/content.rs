// src/fallback/content.rs
//! Substitute content handed to the report compiler when live data is missing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::strategy::StrategyKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackSource {
    Cached,
    Template,
    Manual,
    Derived,
}

/// Provenance, one strict shape per source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum SourceDetails {
    Cached {
        snapshot_id: String,
        captured_at: DateTime<Utc>,
        staleness_days: f64,
    },
    Template {
        industry: String,
        template_id: String,
    },
    Manual {
        curated_by: String,
        curated_at: DateTime<Utc>,
    },
    Derived {
        signals: Vec<String>,
        #[serde(default)]
        based_on_snapshot: Option<String>,
    },
}

impl SourceDetails {
    pub fn source(&self) -> FallbackSource {
        match self {
            SourceDetails::Cached { .. } => FallbackSource::Cached,
            SourceDetails::Template { .. } => FallbackSource::Template,
            SourceDetails::Manual { .. } => FallbackSource::Manual,
            SourceDetails::Derived { .. } => FallbackSource::Derived,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackMetadata {
    #[serde(flatten)]
    pub details: SourceDetails,
    pub confidence: Confidence,
    pub last_updated: DateTime<Utc>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackContent {
    pub title: String,
    pub description: String,
    pub key_features: Vec<String>,
    pub pricing_note: String,
    pub status_note: String,
    pub metadata: FallbackMetadata,
}

impl FallbackContent {
    pub fn source(&self) -> FallbackSource {
        self.metadata.details.source()
    }

    pub fn confidence(&self) -> Confidence {
        self.metadata.confidence
    }
}

/// Audit record for one execution attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackExecution {
    pub strategy_id: StrategyKind,
    pub target_id: String,
    pub executed_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}
