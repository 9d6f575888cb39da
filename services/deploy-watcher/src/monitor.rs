//! ServiceMonitor: poll loop and side effects for one service

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{MissedTickPolicy, ServiceSpec};
use crate::notifier::{AlertPayload, DeliveryRecord, NotifierSet, Severity};
use crate::probe::{CheckResult, HealthProbe};
use crate::rollback::{RollbackDecision, RollbackGuard};
use crate::state::{HealthStatus, ServiceState, Transition};

/// Everything that happened during one check cycle
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub result: CheckResult,
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub transition: Transition,
    pub deliveries: Vec<DeliveryRecord>,
    pub rollback: Option<RollbackDecision>,
}

/// Final view of a service when its monitor stops
#[derive(Debug, Clone)]
pub struct ServiceReport {
    pub name: String,
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub last_result: Option<CheckResult>,
}

/// Owns the state machine and poll loop for exactly one service
pub struct ServiceMonitor {
    spec: ServiceSpec,
    probe: Arc<dyn HealthProbe>,
    notifiers: NotifierSet,
    rollback: Option<Arc<RollbackGuard>>,
    state: ServiceState,
    last_result: Option<CheckResult>,
    missed_tick: MissedTickPolicy,
    verbose: bool,
}

impl std::fmt::Debug for ServiceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMonitor")
            .field("service", &self.spec.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ServiceMonitor {
    pub fn new(
        spec: ServiceSpec,
        probe: Arc<dyn HealthProbe>,
        notifiers: NotifierSet,
        rollback: Option<Arc<RollbackGuard>>,
    ) -> Self {
        let state = ServiceState::new(spec.failure_threshold);
        Self {
            spec,
            probe,
            notifiers,
            rollback,
            state,
            last_result: None,
            missed_tick: MissedTickPolicy::default(),
            verbose: false,
        }
    }

    pub fn with_missed_tick(mut self, policy: MissedTickPolicy) -> Self {
        self.missed_tick = policy;
        self
    }

    /// Log every check result at info instead of debug
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    pub fn report(&self) -> ServiceReport {
        ServiceReport {
            name: self.spec.name.clone(),
            status: self.state.status(),
            consecutive_failures: self.state.consecutive_failures(),
            last_result: self.last_result.clone(),
        }
    }

    /// Probe once, advance the state machine and fire whatever it asks for
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let result = self.probe.check(&self.spec).await;
        self.log_result(&result);

        let previous = self.state.status();
        let transition = self.state.apply(&result);
        let status = self.state.status();
        if previous != status {
            tracing::debug!("'{}': {} -> {}", self.spec.name, previous, status);
        }

        let mut deliveries = Vec::new();
        let mut rollback = None;

        match transition {
            Transition::Alert => {
                tracing::warn!(
                    "'{}' is failing: {} consecutive failures (threshold {}), last error: {}",
                    self.spec.name,
                    self.state.consecutive_failures(),
                    self.state.threshold(),
                    self.state.last_error().unwrap_or("-")
                );
                let payload = self.payload(Severity::Alert, self.state.consecutive_failures());
                deliveries = self.notifiers.dispatch(&payload).await;

                if let Some(guard) = &self.rollback {
                    rollback = Some(guard.try_rollback(&self.spec.name).await);
                }
            }
            Transition::Recovery { failures } => {
                tracing::info!(
                    "Service '{}' recovered after {} consecutive failures",
                    self.spec.name,
                    failures
                );
                let payload = self.payload(Severity::Recovery, failures);
                deliveries = self.notifiers.dispatch(&payload).await;
            }
            Transition::Unchanged => {}
        }

        self.last_result = Some(result.clone());

        CycleOutcome {
            result,
            status,
            consecutive_failures: self.state.consecutive_failures(),
            transition,
            deliveries,
            rollback,
        }
    }

    /// Poll on the service's interval until `cancel` fires.
    ///
    /// An in-flight check is never interrupted; cancellation only prevents
    /// the next tick.
    pub async fn run(mut self, cancel: CancellationToken) -> ServiceReport {
        let interval = self.spec.interval;
        let start = Instant::now();
        let mut scheduled = start;

        tracing::debug!(
            "Polling loop for '{}' started (every {:?})",
            self.spec.name,
            interval
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Polling loop for '{}' cancelled", self.spec.name);
                    break;
                }
                _ = tokio::time::sleep_until(scheduled) => {}
            }

            self.run_cycle().await;

            let now = Instant::now();
            let next = next_tick(start, scheduled, now, interval, self.missed_tick);
            if next > add_saturating(scheduled, interval) {
                tracing::debug!(
                    "Check for '{}' overran its interval, skipping to next tick",
                    self.spec.name
                );
            }
            scheduled = next;
        }

        self.report()
    }

    fn payload(&self, severity: Severity, failure_count: u32) -> AlertPayload {
        AlertPayload {
            service: self.spec.name.clone(),
            severity,
            failure_count,
            last_error: self.state.last_error().map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    fn log_result(&self, result: &CheckResult) {
        let latency_ms = result.latency.map(|l| l.as_secs_f64() * 1000.0).unwrap_or(0.0);
        if result.success {
            if self.verbose {
                tracing::info!(
                    "'{}' healthy: status={:?} latency={:.1}ms",
                    self.spec.name,
                    result.status_code,
                    latency_ms
                );
            } else {
                tracing::debug!(
                    "'{}' healthy: status={:?} latency={:.1}ms",
                    self.spec.name,
                    result.status_code,
                    latency_ms
                );
            }
        } else if self.verbose {
            tracing::info!(
                "'{}' check failed: status={:?} latency={:.1}ms error={}",
                self.spec.name,
                result.status_code,
                latency_ms,
                result.error.as_deref().unwrap_or("-")
            );
        } else {
            tracing::debug!(
                "'{}' check failed: status={:?} latency={:.1}ms error={}",
                self.spec.name,
                result.status_code,
                latency_ms,
                result.error.as_deref().unwrap_or("-")
            );
        }
    }
}

/// Deadline of the next check.
///
/// Ticks are aligned to `start`. When the check that began at `scheduled`
/// finishes after the following tick, `policy` decides what happens to the
/// ticks that elapsed meanwhile.
pub fn next_tick(
    start: Instant,
    scheduled: Instant,
    now: Instant,
    period: Duration,
    policy: MissedTickPolicy,
) -> Instant {
    let due = add_saturating(scheduled, period);
    if now <= due {
        return due;
    }

    match policy {
        MissedTickPolicy::Skip => {
            let period_ns = period.as_nanos().max(1);
            let elapsed_ns = now.saturating_duration_since(start).as_nanos();
            let offset_ns = (elapsed_ns / period_ns + 1).saturating_mul(period_ns);
            let offset = Duration::from_nanos(offset_ns.min(u64::MAX as u128) as u64);
            add_saturating(start, offset)
        }
        MissedTickPolicy::Delay => add_saturating(now, period),
        MissedTickPolicy::Burst => due,
    }
}

/// Roughly 30 years; used when an interval does not fit into an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `instant + duration`, clamped to a far-future deadline instead of panicking
fn add_saturating(instant: Instant, duration: Duration) -> Instant {
    instant
        .checked_add(duration)
        .or_else(|| instant.checked_add(FAR_FUTURE))
        .unwrap_or(instant)
}
