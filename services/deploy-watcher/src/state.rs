//! Per-service failure state machine

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::probe::CheckResult;

/// Health of a service as seen by its monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Failing, but fewer consecutive failures than the threshold
    Degrading,
    /// At or above the threshold; the alert for this episode has fired
    Failing,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degrading => write!(f, "DEGRADING"),
            HealthStatus::Failing => write!(f, "FAILING"),
        }
    }
}

/// Side effect requested by applying one check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    /// Threshold crossed for the first time in this episode
    Alert,
    /// First success after a failing episode of `failures` checks
    Recovery { failures: u32 },
}

/// Mutable state of one service, owned by its monitor
#[derive(Debug, Clone)]
pub struct ServiceState {
    threshold: u32,
    consecutive_failures: u32,
    status: HealthStatus,
    last_success: Option<DateTime<Utc>>,
    last_alert: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl ServiceState {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
            status: HealthStatus::Healthy,
            last_success: None,
            last_alert: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    pub fn last_alert(&self) -> Option<DateTime<Utc>> {
        self.last_alert
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Feed one check result into the state machine
    pub fn apply(&mut self, result: &CheckResult) -> Transition {
        if result.success {
            let previous = self.status;
            let failures = self.consecutive_failures;
            self.consecutive_failures = 0;
            self.status = HealthStatus::Healthy;
            self.last_success = Some(result.timestamp);
            self.last_error = None;

            return if previous == HealthStatus::Failing {
                Transition::Recovery { failures }
            } else {
                Transition::Unchanged
            };
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = result.error.clone();

        if self.consecutive_failures < self.threshold {
            self.status = HealthStatus::Degrading;
            Transition::Unchanged
        } else if self.status != HealthStatus::Failing {
            self.status = HealthStatus::Failing;
            self.last_alert = Some(result.timestamp);
            Transition::Alert
        } else {
            Transition::Unchanged
        }
    }
}
