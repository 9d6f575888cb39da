//! Health probe: one HTTP check against one service

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::ServiceSpec;
use crate::io::{HttpClient, HttpResponse};

/// Outcome of a single health check
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub service_name: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub status_code: Option<u16>,
    pub latency: Option<Duration>,
    pub error: Option<String>,
}

impl CheckResult {
    pub fn healthy(service_name: &str, status_code: u16, latency: Duration) -> Self {
        Self {
            service_name: service_name.to_string(),
            timestamp: Utc::now(),
            success: true,
            status_code: Some(status_code),
            latency: Some(latency),
            error: None,
        }
    }

    pub fn failed(service_name: &str, error: impl Into<String>) -> Self {
        Self {
            service_name: service_name.to_string(),
            timestamp: Utc::now(),
            success: false,
            status_code: None,
            latency: None,
            error: Some(error.into()),
        }
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

/// Executes one health check. Every failure mode is encoded in the result.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, spec: &ServiceSpec) -> CheckResult;
}

/// HTTP implementation of [`HealthProbe`]
pub struct HttpHealthProbe {
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for HttpHealthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpHealthProbe").finish()
    }
}

impl HttpHealthProbe {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, spec: &ServiceSpec) -> CheckResult {
        tracing::debug!("Checking '{}': {} {}", spec.name, spec.method, spec.url);
        let start = Instant::now();

        let outcome = tokio::time::timeout(
            spec.timeout,
            self.http.send(&spec.method, &spec.url, &spec.headers),
        )
        .await;
        let latency = start.elapsed();

        match outcome {
            Ok(Ok(response)) => evaluate_response(spec, &response, latency),
            Ok(Err(e)) => {
                tracing::debug!("Check for '{}' failed: {}", spec.name, e);
                CheckResult::failed(&spec.name, e.to_string()).with_latency(latency)
            }
            Err(_) => {
                tracing::debug!(
                    "Check for '{}' timed out after {:?}",
                    spec.name,
                    spec.timeout
                );
                CheckResult::failed(&spec.name, "Timeout").with_latency(latency)
            }
        }
    }
}

/// Decide whether a received response satisfies the service's expectations
pub fn evaluate_response(
    spec: &ServiceSpec,
    response: &HttpResponse,
    latency: Duration,
) -> CheckResult {
    if response.status != spec.expected_status {
        return CheckResult::failed(
            &spec.name,
            format!(
                "Expected status {}, got {}",
                spec.expected_status, response.status
            ),
        )
        .with_status_code(response.status)
        .with_latency(latency);
    }

    if let Some(expected) = &spec.expected_body {
        if !response.body.contains(expected.as_str()) {
            return CheckResult::failed(
                &spec.name,
                format!("Response body does not contain '{}'", expected),
            )
            .with_status_code(response.status)
            .with_latency(latency);
        }
    }

    CheckResult::healthy(&spec.name, response.status, latency)
}
