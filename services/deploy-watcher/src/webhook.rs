//! Generic JSON webhook notifier

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::io::HttpClient;
use crate::notifier::{AlertPayload, Notifier};

/// Posts the raw alert payload, plus a headline, to an arbitrary endpoint
pub struct WebhookNotifier {
    url: String,
    headers: BTreeMap<String, String>,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl WebhookNotifier {
    pub fn new(url: &str, headers: BTreeMap<String, String>, http: Arc<dyn HttpClient>) -> Self {
        tracing::debug!("Created WebhookNotifier for {}", url);
        Self {
            url: url.to_string(),
            headers,
            http,
        }
    }
}

pub fn render(payload: &AlertPayload) -> Value {
    json!({
        "message": payload.summary(),
        "service": payload.service,
        "severity": payload.severity,
        "failure_count": payload.failure_count,
        "last_error": payload.last_error,
        "timestamp": payload.timestamp.to_rfc3339(),
    })
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn type_name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, payload: &AlertPayload) -> crate::Result<()> {
        let body = render(payload);
        let response = self.http.post_json(&self.url, &self.headers, &body).await?;

        if !(200..300).contains(&response.status) {
            return Err(crate::WatcherError::Notifier(format!(
                "Webhook {} returned status {}: {}",
                self.url, response.status, response.body
            )));
        }

        tracing::debug!("Webhook notification sent to {}", self.url);
        Ok(())
    }
}
