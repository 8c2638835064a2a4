// src/target.rs
//! Targets, snapshots, and the two external contracts the scheduler depends on:
//! the snapshot store (read side only) and the collector.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::error::CollectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Product,
    Competitor,
}

/// Something we take snapshots of. Read from the external store, never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionTarget {
    pub id: String,
    pub kind: TargetKind,
    /// Display name, used by template/derived fallback content.
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub last_snapshot_at: Option<DateTime<Utc>>,
}

impl CollectionTarget {
    pub fn new(id: impl Into<String>, kind: TargetKind, url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            url: url.into(),
            last_snapshot_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Parsed host of the target URL, if the URL is usable at all.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(self.url.trim())
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
    }
}

/// Immutable captured content plus metadata, owned by the snapshot store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub target_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: String,
    pub capture_success: bool,
}

/// Read side of the external snapshot store.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Most recent snapshot whose capture succeeded.
    async fn latest_successful(&self, target_id: &str) -> Result<Option<Snapshot>>;
}

/// Result of one capture attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    pub success: bool,
    pub snapshot_id: Option<String>,
    pub error: Option<CollectionError>,
    pub duration_ms: u64,
}

impl CaptureOutcome {
    pub fn captured(snapshot_id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            snapshot_id: Some(snapshot_id.into()),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(error: CollectionError, duration_ms: u64) -> Self {
        Self {
            success: false,
            snapshot_id: None,
            error: Some(error),
            duration_ms,
        }
    }
}

/// External capture backend. Timeouts and in-attempt retries live behind this trait.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    async fn capture(&self, target: &CollectionTarget) -> CaptureOutcome;
}

// --- In-memory doubles (tests, demo) ---

/// Snapshot store backed by a map. Insertion order per target is creation order.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Mutex<HashMap<String, Vec<Snapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: Snapshot) {
        self.snapshots
            .lock()
            .entry(snapshot.target_id.clone())
            .or_default()
            .push(snapshot);
    }

    pub fn count_for(&self, target_id: &str) -> usize {
        self.snapshots
            .lock()
            .get(target_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn latest_successful(&self, target_id: &str) -> Result<Option<Snapshot>> {
        let guard = self.snapshots.lock();
        Ok(guard.get(target_id).and_then(|v| {
            v.iter()
                .filter(|s| s.capture_success)
                .max_by_key(|s| s.created_at)
                .cloned()
        }))
    }
}

/// Collector that replays queued outcomes per target and records call order.
/// Targets without a queued outcome succeed with a generated snapshot id.
#[derive(Debug, Default)]
pub struct ScriptedCollector {
    script: Mutex<HashMap<String, VecDeque<CaptureOutcome>>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, target_id: &str, outcome: CaptureOutcome) {
        self.script
            .lock()
            .entry(target_id.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn fail_times(&self, target_id: &str, n: usize, error: CollectionError) {
        for _ in 0..n {
            self.push(target_id, CaptureOutcome::failed(error.clone(), 5));
        }
    }

    pub fn call_order(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl Collector for ScriptedCollector {
    async fn capture(&self, target: &CollectionTarget) -> CaptureOutcome {
        self.calls.lock().push(target.id.clone());
        let next = self
            .script
            .lock()
            .get_mut(&target.id)
            .and_then(|q| q.pop_front());
        next.unwrap_or_else(|| CaptureOutcome::captured(format!("snap-{}", target.id), 5))
    }
}
