use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::AlertSink;

/// POSTs `{event, payload}` as JSON to a webhook with bounded retries.
#[derive(Clone)]
pub struct WebhookSink {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    event: &'a str,
    payload: &'a Value,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[async_trait::async_trait]
impl AlertSink for WebhookSink {
    async fn emit(&self, event: &str, payload: &Value) -> Result<()> {
        let body = WebhookBody { event, payload };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("webhook request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unreachable_webhook_gives_up_after_retries() {
        // Port 9 on localhost is discard; nothing listens there in CI.
        let sink = WebhookSink::new("http://127.0.0.1:9/hook".into())
            .with_timeout(1)
            .with_retries(1);
        let res = sink.emit("alert_escalated", &json!({"x": 1})).await;
        assert!(res.is_err());
    }
}
