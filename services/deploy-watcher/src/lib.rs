//! Deploy Watcher - post-deployment health monitor
//!
//! Polls HTTP health endpoints, tracks consecutive failures per service,
//! notifies on failure and recovery, and optionally runs a rollback command.

pub mod config;
pub mod discord;
pub mod error;
pub mod io;
pub mod monitor;
pub mod notifier;
pub mod probe;
pub mod report;
pub mod rollback;
pub mod slack;
pub mod state;
pub mod supervisor;
pub mod webhook;

pub use config::{load_config, Config};
pub use error::{Result, WatcherError};
pub use supervisor::{RunSummary, WatcherSupervisor};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::NotifierConfig;
use crate::discord::DiscordNotifier;
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::monitor::ServiceMonitor;
use crate::notifier::{Notifier, NotifierSet};
use crate::probe::{HealthProbe, HttpHealthProbe};
use crate::rollback::{CommandRollbackExecutor, RollbackExecutor, RollbackGuard};
use crate::slack::SlackNotifier;
use crate::webhook::WebhookNotifier;

/// Instantiate one notifier per configured channel
pub fn build_notifiers(channels: &[NotifierConfig], http: Arc<dyn HttpClient>) -> NotifierSet {
    let notifiers = channels
        .iter()
        .map(|channel| -> Arc<dyn Notifier> {
            match channel {
                NotifierConfig::Slack { webhook_url } => {
                    Arc::new(SlackNotifier::new(webhook_url, Arc::clone(&http)))
                }
                NotifierConfig::Discord {
                    webhook_url,
                    username,
                } => Arc::new(DiscordNotifier::new(
                    webhook_url,
                    username,
                    Arc::clone(&http),
                )),
                NotifierConfig::Webhook { url, headers } => Arc::new(WebhookNotifier::new(
                    url,
                    headers.clone(),
                    Arc::clone(&http),
                )),
            }
        })
        .collect();
    NotifierSet::new(notifiers)
}

/// Assembles a [`WatcherSupervisor`] from a [`Config`].
///
/// Every collaborator can be replaced before [`WatcherBuilder::build`];
/// anything not injected is constructed from the configuration.
pub struct WatcherBuilder {
    config: Config,
    verbose: bool,
    http: Option<Arc<dyn HttpClient>>,
    probe: Option<Arc<dyn HealthProbe>>,
    notifiers: Option<Vec<Arc<dyn Notifier>>>,
    rollback_executor: Option<Arc<dyn RollbackExecutor>>,
    cancel: Option<CancellationToken>,
}

impl WatcherBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            verbose: false,
            http: None,
            probe: None,
            notifiers: None,
            rollback_executor: None,
            cancel: None,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_notifiers(mut self, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        self.notifiers = Some(notifiers);
        self
    }

    pub fn with_rollback_executor(mut self, executor: Arc<dyn RollbackExecutor>) -> Self {
        self.rollback_executor = Some(executor);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Validate the configuration and wire up all monitors. Performs no I/O.
    pub fn build(self) -> Result<WatcherSupervisor> {
        self.config.validate()?;

        let http: Arc<dyn HttpClient> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestHttpClient::new()?),
        };

        let probe: Arc<dyn HealthProbe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(HttpHealthProbe::new(Arc::clone(&http))),
        };

        let notifiers = match self.notifiers {
            Some(notifiers) => NotifierSet::new(notifiers),
            None => build_notifiers(&self.config.notifications.channels(), Arc::clone(&http)),
        };

        let rollback = if self.config.rollback.enabled {
            let executor: Arc<dyn RollbackExecutor> = match self.rollback_executor {
                Some(executor) => executor,
                None => {
                    let command = self.config.rollback.command.clone().ok_or_else(|| {
                        WatcherError::Rollback("rollback enabled without a command".to_string())
                    })?;
                    Arc::new(CommandRollbackExecutor::new(
                        command,
                        self.config.rollback.timeout(),
                    ))
                }
            };
            Some(Arc::new(RollbackGuard::new(
                executor,
                self.config.rollback.cooldown(),
                self.config.rollback.scope,
            )))
        } else {
            None
        };

        let monitors: Vec<ServiceMonitor> = self
            .config
            .service_specs()
            .into_iter()
            .map(|spec| {
                ServiceMonitor::new(
                    spec,
                    Arc::clone(&probe),
                    notifiers.clone(),
                    rollback.clone(),
                )
                .with_missed_tick(self.config.global.missed_tick)
                .with_verbose(self.verbose)
            })
            .collect();

        let notifier_types: Vec<String> = notifiers
            .type_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        tracing::debug!(
            "Built watcher: {} services, notifiers {:?}, rollback {}",
            monitors.len(),
            notifier_types,
            if rollback.is_some() { "enabled" } else { "disabled" }
        );

        Ok(WatcherSupervisor::new(
            monitors,
            notifier_types,
            rollback,
            self.cancel.unwrap_or_default(),
        ))
    }
}
