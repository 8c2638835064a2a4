//! Error taxonomy for collection and monitoring.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse class attached to every recorded failure so operators can tell
/// broken configuration apart from a flaky network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Structural,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Structural => "structural",
        }
    }
}

/// Failure of a single capture attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    /// Network / timeout failure reported by the collector.
    #[error("transient collection error: {0}")]
    Transient(String),

    /// Missing target, URL, or configuration. Not retryable.
    #[error("structural data error: {0}")]
    Structural(String),
}

impl CollectionError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            CollectionError::Transient(_) => ErrorClass::Transient,
            CollectionError::Structural(_) => ErrorClass::Structural,
        }
    }
}

/// Failure inside the monitor's own bookkeeping. Logged, never propagated
/// into the scheduling batch.
#[derive(Error, Debug)]
pub enum MonitoringError {
    #[error("alert persistence failed: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("alert sink `{sink}` failed: {source}")]
    Sink {
        sink: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("alert sink `{sink}` did not finish within {timeout_ms}ms")]
    SinkTimeout { sink: String, timeout_ms: u64 },
}
