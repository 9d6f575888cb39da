//! BDD step definitions for single-check feature

use std::collections::BTreeMap;
use std::sync::Arc;

use cucumber::{given, then, when};

use deploy_watcher::config::ServiceConfig;
use deploy_watcher::io::HttpClient;
use deploy_watcher::notifier::Notifier;
use deploy_watcher::report::render_table;
use deploy_watcher::rollback::RollbackExecutor;
use deploy_watcher::WatcherBuilder;

use crate::world::{CountingExecutor, WatcherWorld};

pub fn service_url(name: &str) -> String {
    format!("http://{}.internal/health", name)
}

fn add_service(world: &mut WatcherWorld, name: &str) {
    world.config.services.push(ServiceConfig {
        name: name.to_string(),
        url: service_url(name),
        method: "GET".to_string(),
        expected_status: 200,
        expected_body: None,
        headers: BTreeMap::new(),
        check_interval_seconds: None,
        timeout_seconds: None,
        failure_threshold: None,
    });
}

fn row<'a>(table: &'a str, name: &str) -> &'a str {
    table
        .lines()
        .skip(2)
        .find(|line| line.split_whitespace().next() == Some(name))
        .unwrap_or_else(|| panic!("no row for '{}' in:\n{}", name, table))
}

// --- Given steps ---

#[given(expr = "a configured service {string} answering {int}")]
fn configured_service(world: &mut WatcherWorld, name: String, status: u16) {
    add_service(world, &name);
    world.http().respond(&service_url(&name), status, "");
}

#[given(expr = "a configured service {string} answering {int} with body {string}")]
fn configured_service_with_body(
    world: &mut WatcherWorld,
    name: String,
    status: u16,
    body: String,
) {
    add_service(world, &name);
    world.http().respond(&service_url(&name), status, &body);
}

#[given(expr = "a configured service {string} that is unreachable")]
fn unreachable_service(world: &mut WatcherWorld, name: String) {
    add_service(world, &name);
    world.http();
}

#[given(expr = "service {string} expects the body to contain {string}")]
fn expects_body(world: &mut WatcherWorld, name: String, expected: String) {
    let service = world
        .config
        .services
        .iter_mut()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no service named '{}'", name));
    service.expected_body = Some(expected);
}

#[given(expr = "service {string} has failure threshold {int}")]
fn service_threshold(world: &mut WatcherWorld, name: String, threshold: u32) {
    let service = world
        .config
        .services
        .iter_mut()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no service named '{}'", name));
    service.failure_threshold = Some(threshold);
}

// --- When steps ---

#[when("the watcher checks every service once")]
async fn check_once(world: &mut WatcherWorld) {
    let http = world.http();
    let notifier = world.notifier();
    let mut builder = WatcherBuilder::new(world.config.clone())
        .with_http_client(http as Arc<dyn HttpClient>)
        .with_notifiers(vec![notifier as Arc<dyn Notifier>]);
    if world.config.rollback.enabled {
        let executor = Arc::new(CountingExecutor::default());
        world.executor = Some(Arc::clone(&executor));
        builder = builder.with_rollback_executor(executor as Arc<dyn RollbackExecutor>);
    }
    let supervisor = builder.build().expect("watcher should build");

    let summary = supervisor.run_once().await;
    world.table = Some(render_table(&summary.services));
    world.summary = Some(summary);
}

// --- Then steps ---

#[then("the run should succeed")]
fn run_should_succeed(world: &mut WatcherWorld) {
    let summary = world.summary.as_ref().expect("no run summary");
    assert!(
        !summary.is_failing(),
        "Expected success, unhealthy: {:?}",
        summary.unhealthy_services()
    );
}

#[then("the run should fail")]
fn run_should_fail(world: &mut WatcherWorld) {
    let summary = world.summary.as_ref().expect("no run summary");
    assert!(summary.is_failing(), "Expected the run to fail");
}

#[then(expr = "the table should show {string} as {string}")]
fn table_shows_status(world: &mut WatcherWorld, name: String, status: String) {
    let table = world.table.as_ref().expect("no table rendered");
    let row = row(table, &name);
    assert_eq!(
        row.split_whitespace().nth(1),
        Some(status.as_str()),
        "row: {}",
        row
    );
}

#[then(expr = "the table should show {string} with error {string}")]
fn table_shows_error(world: &mut WatcherWorld, name: String, error: String) {
    let table = world.table.as_ref().expect("no table rendered");
    let row = row(table, &name);
    assert!(row.ends_with(&error), "row: {}", row);
}

#[then(expr = "{int} requests should have been made")]
async fn requests_made(world: &mut WatcherWorld, count: usize) {
    let http = world.http();
    assert_eq!(http.requests.read().await.len(), count);
}
