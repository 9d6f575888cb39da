//! WatcherSupervisor: starts, stops and aggregates all service monitors

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceSpec;
use crate::monitor::{ServiceMonitor, ServiceReport};
use crate::rollback::RollbackGuard;
use crate::state::HealthStatus;

/// Aggregated result of a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub services: Vec<ServiceReport>,
}

impl RunSummary {
    /// A run fails when any service did not end healthy
    pub fn is_failing(&self) -> bool {
        self.services
            .iter()
            .any(|s| s.status != HealthStatus::Healthy)
    }

    pub fn unhealthy_services(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|s| s.status != HealthStatus::Healthy)
            .map(|s| s.name.as_str())
            .collect()
    }
}

/// Owns one [`ServiceMonitor`] per configured service
pub struct WatcherSupervisor {
    monitors: Vec<ServiceMonitor>,
    notifier_types: Vec<String>,
    rollback: Option<Arc<RollbackGuard>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for WatcherSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherSupervisor")
            .field("monitors", &self.monitors)
            .field("notifier_types", &self.notifier_types)
            .field("rollback", &self.rollback)
            .finish()
    }
}

impl WatcherSupervisor {
    pub fn new(
        monitors: Vec<ServiceMonitor>,
        notifier_types: Vec<String>,
        rollback: Option<Arc<RollbackGuard>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            monitors,
            notifier_types,
            rollback,
            cancel,
        }
    }

    pub fn services(&self) -> Vec<&ServiceSpec> {
        self.monitors.iter().map(|m| m.spec()).collect()
    }

    pub fn notifier_types(&self) -> &[String] {
        &self.notifier_types
    }

    pub fn rollback_guard(&self) -> Option<&Arc<RollbackGuard>> {
        self.rollback.as_ref()
    }

    /// Token that stops every monitor once cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Single-check mode: each monitor runs exactly one cycle, concurrently
    pub async fn run_once(self) -> RunSummary {
        tracing::info!("Checking {} services once", self.monitors.len());

        let handles: Vec<(String, JoinHandle<ServiceReport>)> = self
            .monitors
            .into_iter()
            .map(|mut monitor| {
                let name = monitor.name().to_string();
                let handle = tokio::spawn(async move {
                    monitor.run_cycle().await;
                    monitor.report()
                });
                (name, handle)
            })
            .collect();

        let summary = collect(handles).await;
        if summary.is_failing() {
            tracing::warn!(
                "Unhealthy services: {}",
                summary.unhealthy_services().join(", ")
            );
        } else {
            tracing::info!("All {} services healthy", summary.services.len());
        }
        summary
    }

    /// Continuous mode: poll every service until the cancel token fires
    pub async fn run(self) -> RunSummary {
        tracing::info!("Watching {} services", self.monitors.len());
        for monitor in &self.monitors {
            tracing::info!(
                "  {}: {} {} every {:?} (threshold {})",
                monitor.spec().name,
                monitor.spec().method,
                monitor.spec().url,
                monitor.spec().interval,
                monitor.spec().failure_threshold
            );
        }

        let cancel = self.cancel;
        let handles: Vec<(String, JoinHandle<ServiceReport>)> = self
            .monitors
            .into_iter()
            .map(|monitor| {
                let name = monitor.name().to_string();
                let handle = tokio::spawn(monitor.run(cancel.clone()));
                (name, handle)
            })
            .collect();

        cancel.cancelled().await;
        tracing::info!("Stopping monitors, waiting for in-flight checks");

        collect(handles).await
    }
}

async fn collect(handles: Vec<(String, JoinHandle<ServiceReport>)>) -> RunSummary {
    let mut services = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        match handle.await {
            Ok(report) => services.push(report),
            Err(e) => {
                tracing::error!("Monitor task for '{}' ended abnormally: {}", name, e);
                services.push(ServiceReport {
                    name,
                    status: HealthStatus::Failing,
                    consecutive_failures: 0,
                    last_result: None,
                });
            }
        }
    }
    RunSummary { services }
}
