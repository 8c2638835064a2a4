// src/notify/metrics_sink.rs
use anyhow::Result;
use metrics::{counter, gauge};
use serde_json::Value;

use super::{AlertSink, EVENT_ALERT_ESCALATED, EVENT_HEALTH_SNAPSHOT};

/// Maps alert events onto `metrics` series.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSink;

#[async_trait::async_trait]
impl AlertSink for MetricsSink {
    async fn emit(&self, event: &str, payload: &Value) -> Result<()> {
        match event {
            EVENT_ALERT_ESCALATED => {
                let severity = payload
                    .get("severity")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                counter!("refresh_alert_transitions_total", "severity" => severity).increment(1);
            }
            EVENT_HEALTH_SNAPSHOT => {
                if let Some(n) = payload
                    .pointer("/health/active_alerts")
                    .and_then(Value::as_u64)
                {
                    gauge!("refresh_active_alerts").set(n as f64);
                }
                if let Some(rate) = payload
                    .pointer("/health/success_rate")
                    .and_then(Value::as_f64)
                {
                    gauge!("refresh_success_rate").set(rate);
                }
            }
            other => {
                counter!("refresh_alert_events_total", "event" => other.to_string()).increment(1);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "metrics"
    }
}
