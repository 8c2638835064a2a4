// src/notify/mod.rs
//! Metrics/alert sinks. The monitor only knows `AlertSink::emit(event, payload)`.

pub mod metrics_sink;
pub mod webhook;

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

pub use metrics_sink::MetricsSink;
pub use webhook::WebhookSink;

pub const EVENT_ALERT_ESCALATED: &str = "alert_escalated";
pub const EVENT_ALERT_RESOLVED: &str = "alert_resolved";
pub const EVENT_HEALTH_SNAPSHOT: &str = "health_snapshot";

#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, event: &str, payload: &Value) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Writes events to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait::async_trait]
impl AlertSink for LogSink {
    async fn emit(&self, event: &str, payload: &Value) -> Result<()> {
        match event {
            EVENT_ALERT_ESCALATED => tracing::warn!(target: "alerts", event, %payload, "alert escalated"),
            _ => tracing::info!(target: "alerts", event, %payload, "alert event"),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Fan-out to several sinks. One failing sink does not stop the others;
/// failures are logged and the first one is returned.
#[derive(Clone, Default)]
pub struct SinkMux {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl SinkMux {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }

    /// Log + metrics always; webhook when `ALERT_WEBHOOK_URL` is set.
    pub fn from_env() -> Self {
        let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogSink), Arc::new(MetricsSink)];
        match std::env::var("ALERT_WEBHOOK_URL") {
            Ok(url) if !url.trim().is_empty() => sinks.push(Arc::new(WebhookSink::new(url))),
            _ => tracing::debug!("webhook sink disabled (no ALERT_WEBHOOK_URL)"),
        }
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait::async_trait]
impl AlertSink for SinkMux {
    async fn emit(&self, event: &str, payload: &Value) -> Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event, payload).await {
                tracing::warn!(sink = sink.name(), error = %format!("{e:#}"), "alert sink failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}

// --- Test helper ---
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<(String, Value)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|(n, _)| n == event).count()
    }
}

#[async_trait::async_trait]
impl AlertSink for RecordingSink {
    async fn emit(&self, event: &str, payload: &Value) -> Result<()> {
        self.events.lock().push((event.to_string(), payload.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
