//! Rollback execution and the cooldown guard in front of it

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{RollbackCommand, RollbackScope};

/// Key under which the record is stored when all services share one rollback target
const SHARED_KEY: &str = "*";

/// Environment variable naming the service that triggered the rollback
pub const SERVICE_ENV_VAR: &str = "DEPLOY_WATCHER_SERVICE";

/// Result of one rollback attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    Succeeded,
    Failed(String),
}

impl RollbackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RollbackOutcome::Succeeded)
    }
}

/// Why the guard declined to run a rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    CooldownActive { remaining: Duration },
}

/// What [`RollbackGuard::try_rollback`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackDecision {
    Executed(RollbackOutcome),
    Skipped(SkipReason),
}

/// Runs the rollback action. Must return within a bounded time.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait RollbackExecutor: Send + Sync {
    async fn execute(&self, service: &str) -> RollbackOutcome;
}

/// Runs the configured rollback command as a child process
#[derive(Debug, Clone)]
pub struct CommandRollbackExecutor {
    command: RollbackCommand,
    timeout: Duration,
}

impl CommandRollbackExecutor {
    pub fn new(command: RollbackCommand, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    fn build_command(&self) -> Option<Command> {
        match &self.command {
            RollbackCommand::Shell(line) => {
                let mut cmd = if cfg!(windows) {
                    let mut cmd = Command::new("cmd");
                    cmd.arg("/C");
                    cmd
                } else {
                    let mut cmd = Command::new("sh");
                    cmd.arg("-c");
                    cmd
                };
                cmd.arg(line);
                Some(cmd)
            }
            RollbackCommand::Argv(args) => {
                let (program, rest) = args.split_first()?;
                let mut cmd = Command::new(program);
                cmd.args(rest);
                Some(cmd)
            }
        }
    }
}

#[async_trait]
impl RollbackExecutor for CommandRollbackExecutor {
    async fn execute(&self, service: &str) -> RollbackOutcome {
        let Some(mut cmd) = self.build_command() else {
            return RollbackOutcome::Failed("Rollback command is empty".to_string());
        };

        // dropping the child on timeout kills it
        cmd.env(SERVICE_ENV_VAR, service)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Spawning rollback command: {}", self.command);
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return RollbackOutcome::Failed(format!(
                    "Failed to start rollback command: {}",
                    e
                ))
            }
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                tracing::debug!(
                    "Rollback command stdout: {}",
                    String::from_utf8_lossy(&output.stdout).trim()
                );
                RollbackOutcome::Succeeded
            }
            Ok(Ok(output)) => {
                let code = output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                RollbackOutcome::Failed(format!(
                    "Rollback command exited with {}: {}",
                    code,
                    String::from_utf8_lossy(&output.stderr).trim()
                ))
            }
            Ok(Err(e)) => RollbackOutcome::Failed(format!("Waiting for rollback command: {}", e)),
            Err(_) => RollbackOutcome::Failed(format!(
                "Rollback command timed out after {}s and was killed",
                self.timeout.as_secs_f64()
            )),
        }
    }
}

/// Last rollback attempt for one key
#[derive(Debug, Clone)]
pub struct RollbackRecord {
    pub last_attempt: Instant,
    pub attempted_at: DateTime<Utc>,
    /// `None` while the attempt is still running
    pub outcome: Option<RollbackOutcome>,
}

/// Time left before another attempt is allowed, or `None` if one is allowed now
pub fn cooldown_remaining(
    record: Option<&RollbackRecord>,
    cooldown: Duration,
    now: Instant,
) -> Option<Duration> {
    let record = record?;
    let elapsed = now.saturating_duration_since(record.last_attempt);
    if elapsed >= cooldown {
        None
    } else {
        Some(cooldown - elapsed)
    }
}

/// Enforces the cooldown between rollback attempts.
///
/// Shared by every monitor through an `Arc`. The record map is the only
/// mutable state shared between service tasks; the lock is released while
/// the executor runs, so different keys can roll back concurrently.
pub struct RollbackGuard {
    executor: Arc<dyn RollbackExecutor>,
    cooldown: Duration,
    scope: RollbackScope,
    records: Mutex<HashMap<String, RollbackRecord>>,
}

impl std::fmt::Debug for RollbackGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackGuard")
            .field("cooldown", &self.cooldown)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl RollbackGuard {
    pub fn new(
        executor: Arc<dyn RollbackExecutor>,
        cooldown: Duration,
        scope: RollbackScope,
    ) -> Self {
        Self {
            executor,
            cooldown,
            scope,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    fn key<'a>(&self, service: &'a str) -> &'a str {
        match self.scope {
            RollbackScope::PerService => service,
            RollbackScope::Shared => SHARED_KEY,
        }
    }

    /// Run the rollback for `service` unless its key is still cooling down
    pub async fn try_rollback(&self, service: &str) -> RollbackDecision {
        let key = self.key(service).to_string();
        let now = Instant::now();

        {
            let mut records = self.records.lock().await;
            if let Some(remaining) = cooldown_remaining(records.get(&key), self.cooldown, now) {
                tracing::warn!(
                    "Rollback for '{}' skipped: cooldown active, {}s remaining",
                    service,
                    remaining.as_secs()
                );
                return RollbackDecision::Skipped(SkipReason::CooldownActive { remaining });
            }
            // reserve the slot before releasing the lock
            records.insert(
                key.clone(),
                RollbackRecord {
                    last_attempt: now,
                    attempted_at: Utc::now(),
                    outcome: None,
                },
            );
        }

        tracing::warn!("Executing rollback for '{}'", service);
        let outcome = self.executor.execute(service).await;
        match &outcome {
            RollbackOutcome::Succeeded => tracing::info!("Rollback for '{}' succeeded", service),
            RollbackOutcome::Failed(e) => {
                tracing::error!("Rollback for '{}' failed: {}", service, e)
            }
        }

        if let Some(record) = self.records.lock().await.get_mut(&key) {
            if record.last_attempt == now {
                record.outcome = Some(outcome.clone());
            }
        }

        RollbackDecision::Executed(outcome)
    }

    /// Last attempt recorded for the key `service` maps to
    pub async fn record(&self, service: &str) -> Option<RollbackRecord> {
        self.records.lock().await.get(self.key(service)).cloned()
    }
}
