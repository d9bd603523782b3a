//! HTTP surface
//!
//! | Method | Path                         |
//! |--------|------------------------------|
//! | GET    | `/health`                    |
//! | POST   | `/model/request`             |
//! | POST   | `/model/initialize/:run_id`  |
//! | POST   | `/model/run/:run_id`         |
//! | GET    | `/model/status/:run_id`      |
//! | GET    | `/model/results/:run_id`     |
//! | POST   | `/model/remove/:run_id`      |

use crate::error::{AdapterError, Result};
use crate::runs::{RunManager, RunState};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use energysim_engine::BatchRequest;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Run registry
    pub runs: Arc<RunManager>,
}

impl AppState {
    /// Wrap a run manager
    pub fn new(runs: Arc<RunManager>) -> Self {
        Self { runs }
    }
}

/// Build the adapter router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/model/request", post(request_run))
        .route("/model/initialize/:run_id", post(initialise_run))
        .route("/model/run/:run_id", post(start_run))
        .route("/model/status/:run_id", get(run_status))
        .route("/model/results/:run_id", get(run_results))
        .route("/model/remove/:run_id", post(remove_run))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("🌐 Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn request_run(State(state): State<AppState>) -> Json<serde_json::Value> {
    let run_id = state.runs.create().await;
    Json(json!({ "run_id": run_id }))
}

/// Missing or empty bodies select the default request (whole IDF prefix).
fn parse_request(body: &[u8]) -> Result<BatchRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(BatchRequest::default());
    }
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AdapterError::invalid_request(format!("body is not JSON: {}", e)))?;
    if value.is_null() {
        return Ok(BatchRequest::default());
    }
    serde_json::from_value(value)
        .map_err(|e| AdapterError::invalid_request(format!("bad run configuration: {}", e)))
}

async fn initialise_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    // Unknown runs are 404 even with a malformed body.
    state.runs.get(&run_id).await?;
    let config = parse_request(&body)?;
    let record = state.runs.initialise(&run_id, config).await?;
    Ok(Json(json!({
        "run_id": record.run_id,
        "state": record.state,
        "config": record.config,
    })))
}

async fn start_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Response> {
    let record = state.runs.start(&run_id).await?;
    let status = if record.state == RunState::Error {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    let body = json!({
        "run_id": record.run_id,
        "state": record.state,
        "error": record.error,
    });
    Ok((status, Json(body)).into_response())
}

async fn run_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let record = state.runs.get(&run_id).await?;
    Ok(Json(json!({
        "run_id": record.run_id,
        "state": record.state,
        "error": record.error,
    })))
}

async fn run_results(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Response> {
    let record = state.runs.get(&run_id).await?;
    let response = match record.state {
        RunState::Succeeded => (
            StatusCode::OK,
            Json(json!({ "run_id": record.run_id, "result": record.result })),
        ),
        RunState::Error => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "run_id": record.run_id, "error": record.error })),
        ),
        _ => (
            StatusCode::ACCEPTED,
            Json(json!({ "run_id": record.run_id, "state": record.state })),
        ),
    };
    Ok(response.into_response())
}

async fn remove_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Json<serde_json::Value> {
    state.runs.remove(&run_id).await;
    Json(json!({ "status": "removed", "run_id": run_id }))
}
