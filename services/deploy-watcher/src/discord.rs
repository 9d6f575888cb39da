//! Discord webhook notifier

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::io::HttpClient;
use crate::notifier::{AlertPayload, Notifier, Severity};

const COLOR_RED: u32 = 0xE0_1E_5A;
const COLOR_GREEN: u32 = 0x2E_B6_7D;

/// Discord notification sender
pub struct DiscordNotifier {
    webhook_url: String,
    username: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for DiscordNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordNotifier")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl DiscordNotifier {
    pub fn new(webhook_url: &str, username: &str, http: Arc<dyn HttpClient>) -> Self {
        tracing::debug!("Created DiscordNotifier posting as '{}'", username);
        Self {
            webhook_url: webhook_url.to_string(),
            username: username.to_string(),
            http,
        }
    }

    /// Render the payload as a Discord message with a single embed
    pub fn render(&self, payload: &AlertPayload) -> Value {
        let color = match payload.severity {
            Severity::Alert => COLOR_RED,
            Severity::Recovery => COLOR_GREEN,
        };

        json!({
            "username": self.username,
            "content": payload.summary(),
            "embeds": [{
                "title": payload.service,
                "color": color,
                "timestamp": payload.timestamp.to_rfc3339(),
                "fields": [
                    {
                        "name": "Severity",
                        "value": payload.severity.to_string(),
                        "inline": true
                    },
                    {
                        "name": "Failures",
                        "value": payload.failure_count.to_string(),
                        "inline": true
                    },
                    {
                        "name": "Last error",
                        "value": payload.last_error.as_deref().unwrap_or("-")
                    }
                ]
            }]
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn type_name(&self) -> &str {
        "discord"
    }

    async fn notify(&self, payload: &AlertPayload) -> crate::Result<()> {
        tracing::debug!("Sending Discord notification for '{}'", payload.service);

        let body = self.render(payload);
        let response = self
            .http
            .post_json(&self.webhook_url, &BTreeMap::new(), &body)
            .await?;

        // Discord answers 204 No Content on success
        if !(200..300).contains(&response.status) {
            return Err(crate::WatcherError::Notifier(format!(
                "Discord returned status {}: {}",
                response.status, response.body
            )));
        }

        tracing::debug!("Discord notification sent successfully");
        Ok(())
    }
}
