// src/monitor/store.rs
//! Optional persistence for alert records.

use anyhow::Context;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;

use super::alert::FailureAlert;
use crate::error::MonitoringError;

/// Pluggable alert persistence. Failures are logged by the monitor and never
/// abort a scheduling batch.
#[async_trait::async_trait]
pub trait AlertStore: Send + Sync {
    async fn store_alert(&self, alert: &FailureAlert) -> Result<(), MonitoringError>;
    async fn remove_alert(&self, id: &str) -> Result<(), MonitoringError>;
}

/// Keeps every alert by id and rewrites one pretty-printed JSON file per change.
pub struct JsonFileAlertStore {
    path: PathBuf,
    alerts: Mutex<BTreeMap<String, FailureAlert>>,
}

impl JsonFileAlertStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            alerts: Mutex::new(BTreeMap::new()),
        }
    }

    /// Load previously written alerts, if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let store = Self::new(path);
        match fs::read_to_string(&store.path).await {
            Ok(s) => {
                let list: Vec<FailureAlert> = serde_json::from_str(&s)
                    .with_context(|| format!("parsing alerts in {}", store.path.display()))?;
                let mut guard = store.alerts.lock();
                for a in list {
                    guard.insert(a.id.clone(), a);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).context("reading alert file"),
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }

    async fn flush(&self) -> Result<(), MonitoringError> {
        let bytes = {
            let guard = self.alerts.lock();
            let list: Vec<&FailureAlert> = guard.values().collect();
            serde_json::to_vec_pretty(&list)
                .map_err(|e| MonitoringError::Persistence(e.into()))?
        };
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| MonitoringError::Persistence(e.into()))?;
        }
        fs::write(&self.path, bytes)
            .await
            .map_err(|e| MonitoringError::Persistence(e.into()))
    }
}

#[async_trait::async_trait]
impl AlertStore for JsonFileAlertStore {
    async fn store_alert(&self, alert: &FailureAlert) -> Result<(), MonitoringError> {
        self.alerts.lock().insert(alert.id.clone(), alert.clone());
        self.flush().await
    }

    async fn remove_alert(&self, id: &str) -> Result<(), MonitoringError> {
        let removed = self.alerts.lock().remove(id).is_some();
        if removed {
            self.flush().await
        } else {
            Ok(())
        }
    }
}
