//! BDD step definitions for building the watcher

use std::collections::BTreeMap;
use std::sync::Arc;

use cucumber::{given, then, when};

use deploy_watcher::config::{RollbackCommand, SlackConfig, WebhookConfig};
use deploy_watcher::io::HttpClient;
use deploy_watcher::WatcherBuilder;

use crate::world::{BuiltWatcher, WatcherWorld};

// --- Given steps ---

#[given("rollback is enabled in the config without a command")]
fn rollback_without_command(world: &mut WatcherWorld) {
    world.config.rollback.enabled = true;
    world.config.rollback.command = None;
}

#[given(expr = "rollback is enabled in the config with command {string}")]
fn rollback_with_command(world: &mut WatcherWorld, command: String) {
    world.config.rollback.enabled = true;
    world.config.rollback.command = Some(RollbackCommand::Shell(command));
}

#[given("a slack channel is configured")]
fn slack_configured(world: &mut WatcherWorld) {
    world.config.notifications.slack = Some(SlackConfig {
        webhook_url: "https://hooks.slack.com/services/T000/B000/XXXX".to_string(),
    });
}

#[given("a webhook channel is configured")]
fn webhook_configured(world: &mut WatcherWorld) {
    world.config.notifications.webhook = Some(WebhookConfig {
        url: "https://ops.example.com/deploy-hook".to_string(),
        headers: BTreeMap::new(),
    });
}

// --- When steps ---

#[when("the watcher is built")]
fn watcher_is_built(world: &mut WatcherWorld) {
    let http = world.http();
    let result = WatcherBuilder::new(world.config.clone())
        .with_http_client(http as Arc<dyn HttpClient>)
        .build();

    world.build_result = Some(match result {
        Ok(supervisor) => Ok(BuiltWatcher {
            services: supervisor
                .services()
                .iter()
                .map(|s| s.name.clone())
                .collect(),
            notifier_types: supervisor.notifier_types().to_vec(),
            rollback_enabled: supervisor.rollback_guard().is_some(),
        }),
        Err(e) => Err(e.to_string()),
    });
}

// --- Then steps ---

fn built(world: &WatcherWorld) -> &BuiltWatcher {
    match world.build_result.as_ref().expect("watcher was not built") {
        Ok(built) => built,
        Err(e) => panic!("Expected build to succeed, got: {}", e),
    }
}

#[then("the build should succeed")]
fn build_should_succeed(world: &mut WatcherWorld) {
    built(world);
}

#[then(expr = "the build should fail with {string}")]
fn build_should_fail_with(world: &mut WatcherWorld, message: String) {
    match world.build_result.as_ref().expect("watcher was not built") {
        Ok(_) => panic!("Expected build to fail with '{}'", message),
        Err(e) => assert!(
            e.contains(&message),
            "Expected error containing '{}', got '{}'",
            message,
            e
        ),
    }
}

#[then(regex = r"^(\d+) services? should be planned$")]
fn services_planned(world: &mut WatcherWorld, count: usize) {
    assert_eq!(built(world).services.len(), count);
}

#[then(expr = "the notifiers should be {string}")]
fn notifiers_should_be(world: &mut WatcherWorld, expected: String) {
    let expected: Vec<String> = expected.split(',').map(|s| s.trim().to_string()).collect();
    assert_eq!(built(world).notifier_types, expected);
}

#[then("the rollback guard should be installed")]
fn rollback_guard_installed(world: &mut WatcherWorld) {
    assert!(built(world).rollback_enabled);
}

#[then("no HTTP requests should have been made")]
async fn no_requests(world: &mut WatcherWorld) {
    let http = world.http();
    let requests = http.requests.read().await;
    assert!(requests.is_empty(), "Unexpected requests: {:?}", requests);
}
