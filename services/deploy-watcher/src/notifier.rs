//! Notifier trait, alert payload and fan-out over configured channels

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a notification reports a new failure or the end of one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Alert,
    Recovery,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Alert => write!(f, "alert"),
            Severity::Recovery => write!(f, "recovery"),
        }
    }
}

/// Channel-agnostic notification content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub service: String,
    pub severity: Severity,
    pub failure_count: u32,
    pub last_error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AlertPayload {
    /// One-line human readable headline
    pub fn summary(&self) -> String {
        match self.severity {
            Severity::Alert => format!(
                "Service DOWN: {} ({} consecutive failures)",
                self.service, self.failure_count
            ),
            Severity::Recovery => format!("Service RECOVERED: {}", self.service),
        }
    }
}

/// Record of one delivery attempt on one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub service: String,
    pub channel: String,
    pub severity: Severity,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Trait for sending notifications on a single channel
#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    /// Get the notifier type name (e.g. "slack")
    fn type_name(&self) -> &str;

    /// Send a notification
    async fn notify(&self, payload: &AlertPayload) -> crate::Result<()>;
}

/// Every configured channel. Each one is attempted independently.
#[derive(Debug, Clone, Default)]
pub struct NotifierSet {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn type_names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.type_name()).collect()
    }

    /// Deliver to all channels. Failures are logged and recorded, never returned.
    pub async fn dispatch(&self, payload: &AlertPayload) -> Vec<DeliveryRecord> {
        let mut records = Vec::with_capacity(self.notifiers.len());

        for notifier in &self.notifiers {
            tracing::debug!(
                "Dispatching {} for '{}' via '{}'",
                payload.severity,
                payload.service,
                notifier.type_name()
            );

            let result = notifier.notify(payload).await;
            if let Err(e) = &result {
                tracing::warn!(
                    "Notification via '{}' for '{}' failed: {}",
                    notifier.type_name(),
                    payload.service,
                    e
                );
            }

            records.push(DeliveryRecord {
                service: payload.service.clone(),
                channel: notifier.type_name().to_string(),
                severity: payload.severity,
                success: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
                timestamp: Utc::now(),
            });
        }

        records
    }
}
