//! BDD test world for deploy-watcher

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cucumber::World;
use tokio::sync::RwLock;

use deploy_watcher::config::{Config, ServiceSpec};
use deploy_watcher::io::{HttpClient, HttpResponse};
use deploy_watcher::monitor::{CycleOutcome, ServiceMonitor};
use deploy_watcher::notifier::{AlertPayload, Notifier, Severity};
use deploy_watcher::probe::{CheckResult, HealthProbe};
use deploy_watcher::rollback::{
    RollbackDecision, RollbackExecutor, RollbackGuard, RollbackOutcome,
};
use deploy_watcher::{RunSummary, WatcherError};

#[derive(Debug, Default, World)]
pub struct WatcherWorld {
    // Detection and rollback testing
    pub service: Option<(String, u32)>,
    pub monitors: Vec<ServiceMonitor>,
    pub outcomes: Vec<CycleOutcome>,
    pub notifier: Option<Arc<RecordingNotifier>>,
    pub executor: Option<Arc<CountingExecutor>>,
    pub guard: Option<Arc<RollbackGuard>>,
    pub decisions: Vec<RollbackDecision>,

    // Builder and single-check testing
    pub config: Config,
    pub http: Option<Arc<StubHttpClient>>,
    pub build_result: Option<Result<BuiltWatcher, String>>,
    pub summary: Option<RunSummary>,
    pub table: Option<String>,
}

/// What a successful build exposed, captured before the supervisor is consumed
#[derive(Debug, Clone)]
pub struct BuiltWatcher {
    pub services: Vec<String>,
    pub notifier_types: Vec<String>,
    pub rollback_enabled: bool,
}

impl WatcherWorld {
    pub fn http(&mut self) -> Arc<StubHttpClient> {
        self.http
            .get_or_insert_with(|| Arc::new(StubHttpClient::default()))
            .clone()
    }

    pub fn notifier(&mut self) -> Arc<RecordingNotifier> {
        self.notifier
            .get_or_insert_with(|| Arc::new(RecordingNotifier::default()))
            .clone()
    }

    pub fn severities(&self) -> Vec<Severity> {
        self.notifier
            .as_ref()
            .map(|n| n.severities())
            .unwrap_or_default()
    }
}

/// An HTTP client that answers from a table of canned responses and records every request
#[derive(Debug, Default)]
pub struct StubHttpClient {
    pub responses: Mutex<HashMap<String, HttpResponse>>,
    pub requests: RwLock<Vec<String>>,
}

impl StubHttpClient {
    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            HttpResponse {
                status,
                body: body.to_string(),
            },
        );
    }
}

#[async_trait::async_trait]
impl HttpClient for StubHttpClient {
    async fn send(
        &self,
        method: &str,
        url: &str,
        _headers: &BTreeMap<String, String>,
    ) -> deploy_watcher::Result<HttpResponse> {
        self.requests.write().await.push(format!("{} {}", method, url));
        let response = self.responses.lock().unwrap().get(url).cloned();
        response.ok_or_else(|| WatcherError::Http("connection refused".to_string()))
    }

    async fn post_json(
        &self,
        url: &str,
        _headers: &BTreeMap<String, String>,
        _body: &serde_json::Value,
    ) -> deploy_watcher::Result<HttpResponse> {
        self.requests.write().await.push(format!("POST {}", url));
        Ok(HttpResponse {
            status: 200,
            body: "ok".to_string(),
        })
    }
}

/// A probe that replays a fixed script of outcomes, then keeps succeeding
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    script: Mutex<VecDeque<bool>>,
}

impl ScriptedProbe {
    pub fn new(script: &[bool]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
        }
    }
}

#[async_trait::async_trait]
impl HealthProbe for ScriptedProbe {
    async fn check(&self, spec: &ServiceSpec) -> CheckResult {
        let ok = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if ok {
            CheckResult::healthy(&spec.name, 200, std::time::Duration::from_millis(8))
        } else {
            CheckResult::failed(&spec.name, "Expected status 200, got 500")
                .with_status_code(500)
        }
    }
}

/// A notifier that records every payload it is given
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    payloads: Mutex<Vec<AlertPayload>>,
}

impl RecordingNotifier {
    pub fn severities(&self) -> Vec<Severity> {
        self.payloads
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.severity)
            .collect()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    fn type_name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, payload: &AlertPayload) -> deploy_watcher::Result<()> {
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// A rollback executor that counts invocations instead of running a command
#[derive(Debug, Default)]
pub struct CountingExecutor {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait::async_trait]
impl RollbackExecutor for CountingExecutor {
    async fn execute(&self, _service: &str) -> RollbackOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            RollbackOutcome::Failed("exited with 1: deploy not found".to_string())
        } else {
            RollbackOutcome::Succeeded
        }
    }
}
