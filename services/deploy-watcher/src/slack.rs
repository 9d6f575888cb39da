//! Slack incoming-webhook notifier

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::io::HttpClient;
use crate::notifier::{AlertPayload, Notifier, Severity};

/// Slack notification sender
pub struct SlackNotifier {
    webhook_url: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the webhook URL embeds the secret token
        f.debug_struct("SlackNotifier").finish_non_exhaustive()
    }
}

impl SlackNotifier {
    pub fn new(webhook_url: &str, http: Arc<dyn HttpClient>) -> Self {
        tracing::debug!("Created SlackNotifier");
        Self {
            webhook_url: webhook_url.to_string(),
            http,
        }
    }
}

fn status_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Alert => ":red_circle:",
        Severity::Recovery => ":white_check_mark:",
    }
}

/// Render the payload as a Slack message with a header and a detail block
pub fn render(payload: &AlertPayload) -> Value {
    let headline = payload.summary();
    let detail = format!(
        "{} *{}*: {} consecutive failures, last error: {}",
        status_emoji(payload.severity),
        payload.service,
        payload.failure_count,
        payload.last_error.as_deref().unwrap_or("-")
    );

    json!({
        "text": headline,
        "blocks": [
            {"type": "section", "text": {"type": "mrkdwn", "text": format!("*{}*", headline)}},
            {"type": "section", "text": {"type": "mrkdwn", "text": detail}},
            {"type": "context", "elements": [
                {"type": "mrkdwn", "text": payload.timestamp.to_rfc3339()}
            ]}
        ]
    })
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn type_name(&self) -> &str {
        "slack"
    }

    async fn notify(&self, payload: &AlertPayload) -> crate::Result<()> {
        tracing::debug!("Sending Slack notification for '{}'", payload.service);

        let body = render(payload);
        let response = self
            .http
            .post_json(&self.webhook_url, &BTreeMap::new(), &body)
            .await?;

        if !(200..300).contains(&response.status) {
            return Err(crate::WatcherError::Notifier(format!(
                "Slack returned status {}: {}",
                response.status, response.body
            )));
        }

        tracing::debug!("Slack notification sent successfully");
        Ok(())
    }
}
