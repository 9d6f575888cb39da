//! BDD step definitions for rollback guard feature

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use cucumber::{given, then, when};

use deploy_watcher::config::RollbackScope;
use deploy_watcher::rollback::{RollbackDecision, RollbackExecutor, RollbackGuard, SkipReason};

use crate::steps::detection_steps::monitor;
use crate::world::{CountingExecutor, WatcherWorld};

fn install_guard(world: &mut WatcherWorld, cooldown_seconds: u64, scope: RollbackScope) {
    let executor = Arc::new(CountingExecutor::default());
    world.guard = Some(Arc::new(RollbackGuard::new(
        Arc::clone(&executor) as Arc<dyn RollbackExecutor>,
        Duration::from_secs(cooldown_seconds),
        scope,
    )));
    world.executor = Some(executor);
}

// --- Given steps ---

#[given(expr = "rollback is enabled with a cooldown of {int} seconds")]
fn rollback_enabled(world: &mut WatcherWorld, cooldown_seconds: u64) {
    install_guard(world, cooldown_seconds, RollbackScope::PerService);
}

#[given(expr = "rollback is enabled with a cooldown of {int} seconds and shared scope")]
fn rollback_enabled_shared(world: &mut WatcherWorld, cooldown_seconds: u64) {
    install_guard(world, cooldown_seconds, RollbackScope::Shared);
}

#[given("the rollback command fails")]
fn rollback_command_fails(world: &mut WatcherWorld) {
    world
        .executor
        .as_ref()
        .expect("rollback not enabled")
        .fail
        .store(true, Ordering::SeqCst);
}

// --- When steps ---

#[when(expr = "services {string} and {string} both cross their threshold")]
async fn both_cross_threshold(world: &mut WatcherWorld, first: String, second: String) {
    let mut a = monitor(world, &first, 1, &[false]);
    let mut b = monitor(world, &second, 1, &[false]);

    let (outcome_a, outcome_b) = tokio::join!(a.run_cycle(), b.run_cycle());
    for outcome in [outcome_a, outcome_b] {
        if let Some(decision) = &outcome.rollback {
            world.decisions.push(decision.clone());
        }
        world.outcomes.push(outcome);
    }
    world.monitors.extend([a, b]);
}

// --- Then steps ---

#[then(regex = r"^the rollback should have been executed (\d+) times?$")]
fn rollback_executed(world: &mut WatcherWorld, count: usize) {
    let calls = world
        .executor
        .as_ref()
        .expect("rollback not enabled")
        .calls
        .load(Ordering::SeqCst);
    assert_eq!(calls, count, "unexpected number of rollback executions");
}

#[then("the last rollback should have been skipped for cooldown")]
fn last_rollback_skipped(world: &mut WatcherWorld) {
    let last = world.decisions.last().expect("no rollback decisions recorded");
    assert!(
        matches!(
            last,
            RollbackDecision::Skipped(SkipReason::CooldownActive { .. })
        ),
        "Expected cooldown skip, got {:?}",
        last
    );
}

#[then(regex = r"^(\d+) rollbacks? should have been skipped for cooldown$")]
fn rollbacks_skipped(world: &mut WatcherWorld, count: usize) {
    let skipped = world
        .decisions
        .iter()
        .filter(|d| matches!(d, RollbackDecision::Skipped(_)))
        .count();
    assert_eq!(skipped, count);
}

#[then(regex = r"^(\d+) rollback decisions? should have been made$")]
fn rollback_decisions_made(world: &mut WatcherWorld, count: usize) {
    assert_eq!(world.decisions.len(), count);
}
