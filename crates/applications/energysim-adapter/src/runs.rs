//! Run lifecycle
//!
//! Every simulation request becomes a run that callers drive through the HTTP
//! API:
//!
//! ```text
//! PENDING ──initialise──▶ INITIALISED ──start──▶ QUEUED ──permit──▶ RUNNING ──▶ SUCCEEDED
//!    └────────────────────start─────────────────────┘                     └──▶ ERROR
//! ```
//!
//! ## Single worker
//!
//! Runs execute on background tasks gated by a one-permit semaphore, so at
//! most one simulation is in flight per adapter. Extra runs wait in `QUEUED`.
//! HTTP handlers never wait on a simulation.
//!
//! Removing a run aborts its task; the EnergyPlus child is spawned with
//! kill-on-drop, so an in-flight simulation dies with it.

use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use energysim_engine::{BatchRequest, SimulationBatch};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Simulations allowed in flight per adapter
pub const MAX_CONCURRENT_RUNS: usize = 1;

/// State of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Created, not yet configured
    Pending,
    /// Configured, not yet started
    Initialised,
    /// Started, waiting for the worker
    Queued,
    /// Simulation in progress
    Running,
    /// Finished with a result
    Succeeded,
    /// Finished with an error
    Error,
}

impl RunState {
    /// Whether `start` has already been accepted for this state
    pub fn is_started(&self) -> bool {
        !matches!(self, Self::Pending | Self::Initialised)
    }

    /// Whether the run has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Error)
    }
}

/// Snapshot of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run id
    pub run_id: String,
    /// Current state
    pub state: RunState,
    /// Requested artifacts
    pub config: BatchRequest,
    /// Result on success
    pub result: Option<serde_json::Value>,
    /// Error message on failure
    pub error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time the simulation acquired the worker
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    fn new(run_id: String) -> Self {
        Self {
            run_id,
            state: RunState::Pending,
            config: BatchRequest::default(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Executes one run's simulation
#[async_trait]
pub trait SimulationExecutor: Send + Sync + 'static {
    /// Run the simulation and return its JSON result
    async fn execute(&self, run_id: &str, request: &BatchRequest) -> Result<serde_json::Value>;
}

/// Executor backed by the simulation engine
pub struct EngineExecutor {
    batch: SimulationBatch,
}

impl EngineExecutor {
    /// Create an executor for `batch`
    pub fn new(batch: SimulationBatch) -> Self {
        Self { batch }
    }
}

#[async_trait]
impl SimulationExecutor for EngineExecutor {
    async fn execute(&self, run_id: &str, request: &BatchRequest) -> Result<serde_json::Value> {
        info!(run_id = %run_id, request = ?request, "Running simulation batch");
        let report = self.batch.run(request).await?;
        Ok(serde_json::to_value(report)?)
    }
}

struct RunEntry {
    record: RunRecord,
    task: Option<JoinHandle<()>>,
}

/// Registry of runs plus the single-worker gate
pub struct RunManager {
    runs: Mutex<HashMap<String, RunEntry>>,
    executor: Arc<dyn SimulationExecutor>,
    worker: Arc<Semaphore>,
    id_prefix: String,
}

impl RunManager {
    /// Create a manager
    pub fn new(executor: Arc<dyn SimulationExecutor>, id_prefix: impl Into<String>) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            executor,
            worker: Arc::new(Semaphore::new(MAX_CONCURRENT_RUNS)),
            id_prefix: id_prefix.into(),
        }
    }

    /// Create a run in `PENDING`
    pub async fn create(&self) -> String {
        let run_id = format!("{}-{}", self.id_prefix, uuid::Uuid::new_v4());
        self.runs.lock().await.insert(
            run_id.clone(),
            RunEntry {
                record: RunRecord::new(run_id.clone()),
                task: None,
            },
        );
        info!(run_id = %run_id, "Run created");
        run_id
    }

    /// Store the run configuration.
    ///
    /// Only effective before `start`; afterwards the current record is returned
    /// unchanged.
    pub async fn initialise(&self, run_id: &str, config: BatchRequest) -> Result<RunRecord> {
        let mut runs = self.runs.lock().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| AdapterError::RunNotFound(run_id.to_string()))?;

        if !entry.record.state.is_started() {
            entry.record.state = RunState::Initialised;
            entry.record.config = config;
            info!(run_id = %run_id, config = ?entry.record.config, "Run initialised");
        }
        Ok(entry.record.clone())
    }

    /// Queue the run for execution. Idempotent once started.
    pub async fn start(self: &Arc<Self>, run_id: &str) -> Result<RunRecord> {
        let mut runs = self.runs.lock().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| AdapterError::RunNotFound(run_id.to_string()))?;

        if entry.record.state.is_started() {
            return Ok(entry.record.clone());
        }

        entry.record.state = RunState::Queued;
        let manager = Arc::clone(self);
        let id = run_id.to_string();
        let request = entry.record.config.clone();
        // The task locks `runs` first thing, so it waits until this insert is done.
        entry.task = Some(tokio::spawn(async move {
            manager.execute(id, request).await;
        }));

        info!(run_id = %run_id, "Run queued");
        Ok(entry.record.clone())
    }

    async fn execute(&self, run_id: String, request: BatchRequest) {
        let _permit = match Arc::clone(&self.worker).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.finish(&run_id, Err(AdapterError::config("worker pool closed")))
                    .await;
                return;
            }
        };

        {
            let mut runs = self.runs.lock().await;
            let Some(entry) = runs.get_mut(&run_id) else {
                return;
            };
            entry.record.state = RunState::Running;
            entry.record.started_at = Some(Utc::now());
        }
        info!(run_id = %run_id, "Run started");

        let outcome = self.executor.execute(&run_id, &request).await;
        self.finish(&run_id, outcome).await;
    }

    async fn finish(&self, run_id: &str, outcome: Result<serde_json::Value>) {
        let mut runs = self.runs.lock().await;
        let Some(entry) = runs.get_mut(run_id) else {
            return;
        };

        match outcome {
            Ok(result) => {
                entry.record.state = RunState::Succeeded;
                entry.record.result = Some(result);
                info!(run_id = %run_id, "Run succeeded");
            }
            Err(e) => {
                error!(run_id = %run_id, "Run failed: {}", e);
                entry.record.state = RunState::Error;
                entry.record.error = Some(e.to_string());
            }
        }
        entry.record.finished_at = Some(Utc::now());
        entry.task = None;
    }

    /// Current record of a run
    pub async fn get(&self, run_id: &str) -> Result<RunRecord> {
        self.runs
            .lock()
            .await
            .get(run_id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| AdapterError::RunNotFound(run_id.to_string()))
    }

    /// Forget a run, aborting it if still queued or running. Idempotent.
    pub async fn remove(&self, run_id: &str) {
        if let Some(entry) = self.runs.lock().await.remove(run_id) {
            if let Some(task) = entry.task {
                warn!(run_id = %run_id, state = ?entry.record.state, "Aborting run");
                task.abort();
            }
            info!(run_id = %run_id, "Run removed");
        }
    }

    /// Number of simulations currently holding the worker
    pub fn busy_workers(&self) -> usize {
        MAX_CONCURRENT_RUNS - self.worker.available_permits()
    }
}
