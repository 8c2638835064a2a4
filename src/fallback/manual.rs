// src/fallback/manual.rs
//! Operator-curated records used by the manual-override strategy.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualOverride {
    pub target_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub key_features: Vec<String>,
    #[serde(default)]
    pub pricing_note: Option<String>,
    pub curated_by: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait ManualOverrideStore: Send + Sync {
    async fn get(&self, target_id: &str) -> Result<Option<ManualOverride>>;
}

#[derive(Debug, Default)]
pub struct InMemoryManualStore {
    records: RwLock<HashMap<String, ManualOverride>>,
}

impl InMemoryManualStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of records. Later entries for the same target win.
    pub fn load_from_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading manual overrides from {}", path.display()))?;
        let list: Vec<ManualOverride> =
            serde_json::from_str(&content).context("parsing manual overrides")?;
        let store = Self::new();
        for rec in list {
            store.upsert(rec);
        }
        Ok(store)
    }

    pub fn upsert(&self, record: ManualOverride) {
        self.records
            .write()
            .insert(record.target_id.clone(), record);
    }

    pub fn remove(&self, target_id: &str) -> Option<ManualOverride> {
        self.records.write().remove(target_id)
    }
}

#[async_trait::async_trait]
impl ManualOverrideStore for InMemoryManualStore {
    async fn get(&self, target_id: &str) -> Result<Option<ManualOverride>> {
        Ok(self.records.read().get(target_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_file_loads_and_last_entry_wins() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("overrides.json");
        std::fs::write(
            &p,
            r#"[
              {"target_id":"acme","title":"Old","description":"d","curated_by":"ops","updated_at":"2025-09-01T00:00:00Z"},
              {"target_id":"acme","title":"New","description":"d","curated_by":"ops","updated_at":"2025-09-02T00:00:00Z"}
            ]"#,
        )
        .unwrap();
        let store = InMemoryManualStore::load_from_json(&p).unwrap();
        let rec = store.get("acme").await.unwrap().unwrap();
        assert_eq!(rec.title, "New");
        assert!(store.get("other").await.unwrap().is_none());
    }
}
