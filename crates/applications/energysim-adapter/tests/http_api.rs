//! HTTP API tests against the router, with a scripted executor or the real
//! engine driving a stand-in `energyplus`

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use energysim_adapter::{router, AppState, EngineExecutor, RunManager, SimulationExecutor};
use energysim_engine::storage::mock::MemoryStore;
use energysim_engine::{BatchRequest, EngineConfig, SimulationBatch};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Sleeps per request, tracking peak concurrency
struct ScriptedExecutor {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExecutor {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SimulationExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        run_id: &str,
        request: &BatchRequest,
    ) -> energysim_adapter::Result<Value> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({ "run_id": run_id, "idf_key": request.idf_key }))
    }
}

fn app(executor: Arc<ScriptedExecutor>) -> Router {
    router(AppState::new(Arc::new(RunManager::new(executor, "run"))))
}

/// Router over the real engine with `exe` standing in for EnergyPlus
#[cfg(unix)]
fn engine_app(exe: std::path::PathBuf, timeout: Duration) -> Router {
    let store = MemoryStore::new("mmstore");
    store.insert("weather/epw/Rotterdam_RCP45_2030.epw", b"epw".to_vec());
    store.insert("output_idf_files/RCP4.5_E1_2030.idf", b"idf".to_vec());

    let config = EngineConfig::default()
        .with_executable(exe)
        .with_timeout(timeout);
    let batch = SimulationBatch::new(Arc::new(config), Arc::new(store));
    let executor = Arc::new(EngineExecutor::new(batch));
    router(AppState::new(Arc::new(RunManager::new(executor, "run"))))
}

#[cfg(unix)]
fn install_script(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("energyplus");
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn new_run(app: &Router) -> String {
    let (status, body) = call(app, "POST", "/model/request", None).await;
    assert_eq!(status, StatusCode::OK);
    body["run_id"].as_str().unwrap().to_string()
}

async fn wait_results(app: &Router, run_id: &str) -> (StatusCode, Value) {
    for _ in 0..300 {
        let (status, body) = call(app, "GET", &format!("/model/results/{run_id}"), None).await;
        if status != StatusCode::ACCEPTED {
            return (status, body);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} never finished");
}

#[tokio::test]
async fn test_health() {
    let app = app(ScriptedExecutor::new(Duration::ZERO));
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_full_lifecycle() {
    let app = app(ScriptedExecutor::new(Duration::from_millis(30)));
    let run_id = new_run(&app).await;
    assert!(run_id.starts_with("run-"));

    let (status, body) = call(
        &app,
        "POST",
        &format!("/model/initialize/{run_id}"),
        Some(json!({ "idf_key": "RCP45_T1_2050.idf" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "INITIALISED");
    assert_eq!(body["config"]["idf_key"], "RCP45_T1_2050.idf");

    let (status, body) = call(&app, "POST", &format!("/model/run/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "QUEUED");
    assert_eq!(body["error"], Value::Null);

    let (status, body) = call(&app, "GET", &format!("/model/results/{run_id}"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["state"] == "QUEUED" || body["state"] == "RUNNING");

    let (status, body) = wait_results(&app, &run_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["idf_key"], "RCP45_T1_2050.idf");

    let (status, body) = call(&app, "GET", &format!("/model/status/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "SUCCEEDED");

    let (status, body) = call(&app, "POST", &format!("/model/remove/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "removed", "run_id": run_id }));

    let (status, _) = call(&app, "GET", &format!("/model/status/{run_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_initialise_without_body() {
    let app = app(ScriptedExecutor::new(Duration::ZERO));
    let run_id = new_run(&app).await;

    let (status, body) = call(&app, "POST", &format!("/model/initialize/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["idf_key"], Value::Null);
}

#[tokio::test]
async fn test_initialise_rejects_bad_body() {
    let app = app(ScriptedExecutor::new(Duration::ZERO));
    let run_id = new_run(&app).await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/model/initialize/{run_id}"),
        Some(json!({ "idf_key": 42 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid request"));
}

#[tokio::test]
async fn test_unknown_run_is_404() {
    let app = app(ScriptedExecutor::new(Duration::ZERO));
    for (method, path) in [
        ("POST", "/model/initialize/missing"),
        ("POST", "/model/run/missing"),
        ("GET", "/model/status/missing"),
        ("GET", "/model/results/missing"),
    ] {
        let (status, body) = call(&app, method, path, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {path}");
        assert_eq!(body["error"], "Run missing does not exist");
    }

    // Removal is idempotent.
    let (status, _) = call(&app, "POST", "/model/remove/missing", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[cfg(unix)]
#[tokio::test]
async fn test_energyplus_timeout_reported_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let exe = install_script(dir.path(), "#!/bin/sh\nexec sleep 30\n");
    let app = engine_app(exe, Duration::from_millis(200));

    let run_id = new_run(&app).await;
    let (status, _) = call(
        &app,
        "POST",
        &format!("/model/initialize/{run_id}"),
        Some(json!({ "idf_key": "RCP4.5_E1_2030.idf" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    call(&app, "POST", &format!("/model/run/{run_id}"), None).await;

    let (status, body) = wait_results(&app, &run_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["error"].as_str().unwrap().contains("timed out"),
        "body: {body}"
    );

    let (status, body) = call(&app, "GET", &format!("/model/status/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "ERROR");

    // Restarting a failed run reports the failure.
    let (status, body) = call(&app, "POST", &format!("/model/run/{run_id}"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["state"], "ERROR");
}

#[tokio::test]
async fn test_concurrent_runs_execute_one_at_a_time() {
    let executor = ScriptedExecutor::new(Duration::from_millis(40));
    let app = app(executor.clone());

    let mut ids = Vec::new();
    for _ in 0..3 {
        let run_id = new_run(&app).await;
        let (status, _) = call(&app, "POST", &format!("/model/run/{run_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        ids.push(run_id);
    }

    for run_id in &ids {
        let (status, _) = wait_results(&app, run_id).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(executor.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_serves_on_bound_port() {
    let app = app(ScriptedExecutor::new(Duration::ZERO));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(energysim_adapter::serve(listener, app, async move {
        let _ = stop_rx.await;
    }));

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
