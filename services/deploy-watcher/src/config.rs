//! Configuration types for the deploy watcher

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub rollback: RollbackConfig,
}

/// Defaults applied to every service that does not override them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default)]
    pub missed_tick: MissedTickPolicy,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            timeout_seconds: default_timeout(),
            failure_threshold: default_failure_threshold(),
            missed_tick: MissedTickPolicy::default(),
        }
    }
}

/// What the poll loop does with ticks that elapsed while a check was still running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedTickPolicy {
    /// Drop missed ticks and wait for the next interval boundary
    #[default]
    Skip,
    /// Restart the interval from the moment the late check finished
    Delay,
    /// Run the missed checks back to back until caught up
    Burst,
}

/// One monitored service as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    #[serde(default)]
    pub expected_body: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub check_interval_seconds: Option<u64>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub failure_threshold: Option<u32>,
}

/// Fully resolved, immutable description of a monitored service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub url: String,
    pub method: String,
    pub expected_status: u16,
    pub expected_body: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
    pub interval: Duration,
    pub failure_threshold: u32,
}

/// Notification channels, keyed by channel type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub discord: Option<DiscordConfig>,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub webhook_url: String,
    #[serde(default = "default_discord_username")]
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// A single notification channel, one variant per supported backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierConfig {
    Slack {
        webhook_url: String,
    },
    Discord {
        webhook_url: String,
        username: String,
    },
    Webhook {
        url: String,
        headers: BTreeMap<String, String>,
    },
}

impl NotifierConfig {
    pub fn type_name(&self) -> &str {
        match self {
            NotifierConfig::Slack { .. } => "slack",
            NotifierConfig::Discord { .. } => "discord",
            NotifierConfig::Webhook { .. } => "webhook",
        }
    }

    fn target_url(&self) -> &str {
        match self {
            NotifierConfig::Slack { webhook_url } => webhook_url,
            NotifierConfig::Discord { webhook_url, .. } => webhook_url,
            NotifierConfig::Webhook { url, .. } => url,
        }
    }
}

impl NotificationsConfig {
    /// Flatten the keyed block into the list of configured channels
    pub fn channels(&self) -> Vec<NotifierConfig> {
        let mut channels = Vec::new();
        if let Some(slack) = &self.slack {
            channels.push(NotifierConfig::Slack {
                webhook_url: slack.webhook_url.clone(),
            });
        }
        if let Some(discord) = &self.discord {
            channels.push(NotifierConfig::Discord {
                webhook_url: discord.webhook_url.clone(),
                username: discord.username.clone(),
            });
        }
        if let Some(webhook) = &self.webhook {
            channels.push(NotifierConfig::Webhook {
                url: webhook.url.clone(),
                headers: webhook.headers.clone(),
            });
        }
        channels
    }
}

/// Rollback policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub command: Option<RollbackCommand>,
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_rollback_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub scope: RollbackScope,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: None,
            cooldown_seconds: default_cooldown(),
            timeout_seconds: default_rollback_timeout(),
            scope: RollbackScope::default(),
        }
    }
}

impl RollbackConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Rollback command, either a shell line or an explicit argument vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RollbackCommand {
    Shell(String),
    Argv(Vec<String>),
}

impl RollbackCommand {
    fn is_empty(&self) -> bool {
        match self {
            RollbackCommand::Shell(line) => line.trim().is_empty(),
            RollbackCommand::Argv(args) => args.first().is_none_or(|a| a.trim().is_empty()),
        }
    }
}

impl std::fmt::Display for RollbackCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackCommand::Shell(line) => write!(f, "{}", line),
            RollbackCommand::Argv(args) => write!(f, "{}", args.join(" ")),
        }
    }
}

/// Whether cooldown is tracked per service or for one shared rollback target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackScope {
    #[default]
    PerService,
    Shared,
}

fn default_check_interval() -> u64 {
    10
}

fn default_timeout() -> u64 {
    5
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> u16 {
    200
}

fn default_discord_username() -> String {
    "deploy-watcher".to_string()
}

fn default_cooldown() -> u64 {
    300
}

fn default_rollback_timeout() -> u64 {
    300
}

impl Config {
    /// Resolve each service against the global defaults
    pub fn service_specs(&self) -> Vec<ServiceSpec> {
        self.services
            .iter()
            .map(|svc| ServiceSpec {
                name: svc.name.clone(),
                url: svc.url.clone(),
                method: svc.method.to_uppercase(),
                expected_status: svc.expected_status,
                expected_body: svc.expected_body.clone(),
                headers: svc.headers.clone(),
                timeout: Duration::from_secs(
                    svc.timeout_seconds.unwrap_or(self.global.timeout_seconds),
                ),
                interval: Duration::from_secs(
                    svc.check_interval_seconds
                        .unwrap_or(self.global.check_interval_seconds),
                ),
                failure_threshold: svc
                    .failure_threshold
                    .unwrap_or(self.global.failure_threshold),
            })
            .collect()
    }

    /// Check every invariant the monitors rely on
    pub fn validate(&self) -> crate::Result<()> {
        if self.services.is_empty() {
            return Err(config_error("no services configured"));
        }

        let mut seen = HashSet::new();
        for spec in self.service_specs() {
            if spec.name.trim().is_empty() {
                return Err(config_error("service name must not be empty"));
            }
            if !seen.insert(spec.name.clone()) {
                return Err(config_error(format!(
                    "duplicate service name '{}'",
                    spec.name
                )));
            }

            match reqwest::Url::parse(&spec.url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => {
                    return Err(config_error(format!(
                        "service '{}': unsupported URL scheme '{}'",
                        spec.name,
                        url.scheme()
                    )))
                }
                Err(e) => {
                    return Err(config_error(format!(
                        "service '{}': invalid URL '{}': {}",
                        spec.name, spec.url, e
                    )))
                }
            }

            if reqwest::Method::from_bytes(spec.method.as_bytes()).is_err() {
                return Err(config_error(format!(
                    "service '{}': invalid HTTP method '{}'",
                    spec.name, spec.method
                )));
            }
            validate_headers(&spec.headers)
                .map_err(|e| config_error(format!("service '{}': {}", spec.name, e)))?;
            if spec.interval.is_zero() {
                return Err(config_error(format!(
                    "service '{}': check interval must be greater than 0",
                    spec.name
                )));
            }
            if spec.timeout.is_zero() {
                return Err(config_error(format!(
                    "service '{}': timeout must be greater than 0",
                    spec.name
                )));
            }
            if spec.failure_threshold == 0 {
                return Err(config_error(format!(
                    "service '{}': failure threshold must be at least 1",
                    spec.name
                )));
            }
        }

        for channel in self.notifications.channels() {
            if channel.target_url().trim().is_empty() {
                return Err(config_error(format!(
                    "{} notification URL must not be empty",
                    channel.type_name()
                )));
            }
            if let NotifierConfig::Webhook { headers, .. } = &channel {
                validate_headers(headers)
                    .map_err(|e| config_error(format!("webhook notification: {}", e)))?;
            }
        }

        if self.rollback.enabled {
            match &self.rollback.command {
                Some(command) if !command.is_empty() => {}
                _ => {
                    return Err(config_error(
                        "rollback is enabled but no command is configured",
                    ))
                }
            }
            if self.rollback.timeout_seconds == 0 {
                return Err(config_error("rollback timeout must be greater than 0"));
            }
        }

        Ok(())
    }
}

/// Reject header names and values reqwest would refuse at request time
fn validate_headers(headers: &BTreeMap<String, String>) -> Result<(), String> {
    for (name, value) in headers {
        if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(format!("invalid header name '{}'", name));
        }
        if reqwest::header::HeaderValue::from_str(value).is_err() {
            return Err(format!("invalid value for header '{}'", name));
        }
    }
    Ok(())
}

fn config_error(msg: impl Into<String>) -> crate::WatcherError {
    crate::WatcherError::Config(msg.into())
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::WatcherError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
