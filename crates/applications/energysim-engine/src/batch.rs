//! Simulation batch
//!
//! One batch pairs input definitions with weather files, runs EnergyPlus for
//! each pair and records the site energy metrics in the result workbooks.
//!
//! ## Flow
//!
//! 1. Index weather files under the EPW prefix by (scenario, year)
//! 2. Collect IDF keys (one requested key, or everything under the IDF prefix)
//! 3. For each IDF, in key order:
//!    - parse scenario/aging/year from its name
//!    - resolve its weather file (explicit key, or the index)
//!    - download both into a scratch directory
//!    - run EnergyPlus (bounded by the run timeout)
//!    - extract metrics and record them in both workbooks
//! 4. Report counts and per-input outcomes
//!
//! A failing input is counted and logged; the batch carries on with the next.
//! A single requested input that fails, or a batch where every input failed,
//! returns that input's error instead of a report.

use crate::config::{EngineConfig, StorageConfig};
use crate::energyplus::EnergyPlusRunner;
use crate::error::{EngineError, Result};
use crate::metrics::{extract_metrics, MetricsSource, SiteEnergy};
use crate::naming::{file_name, EpwName, IdfName, Scenario};
use crate::storage::ObjectStore;
use crate::workbook::{row_for_year, ResultsWorkbook};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Number of processed keys echoed back in the report
const PROCESSED_PREVIEW: usize = 10;

/// Scratch directory prefix for one simulation
const RUN_DIR_PREFIX: &str = "eplus_run_";

/// Which artifacts a batch should process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Single input definition (key or bare file name); `None` = whole IDF prefix
    #[serde(default)]
    pub idf_key: Option<String>,

    /// Weather file to use (key or bare file name); `None` = resolve by name
    #[serde(default)]
    pub epw_key: Option<String>,
}

impl BatchRequest {
    /// Process every IDF under the configured prefix
    pub fn all() -> Self {
        Self::default()
    }

    /// Process a single IDF
    pub fn single(idf_key: impl Into<String>) -> Self {
        Self {
            idf_key: Some(idf_key.into()),
            epw_key: None,
        }
    }

    /// Use an explicit weather file
    pub fn with_epw(mut self, epw_key: impl Into<String>) -> Self {
        self.epw_key = Some(epw_key.into());
        self
    }
}

/// Outcome status of one input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Simulated and recorded
    Succeeded,
    /// No weather file matched the input
    Skipped,
    /// Any other failure
    Failed,
}

/// Outcome of one input definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputOutcome {
    /// IDF key
    pub idf_key: String,
    /// Weather key used, if resolved
    pub epw_key: Option<String>,
    /// Outcome status
    pub status: OutcomeStatus,
    /// Metrics source
    pub source: Option<MetricsSource>,
    /// Total site energy
    pub total_site: Option<f64>,
    /// Site energy per building area
    pub per_area: Option<f64>,
    /// Failure message
    pub error: Option<String>,
    /// Wall-clock time spent on this input (seconds)
    pub elapsed_secs: f64,
}

/// Success/failure counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    /// Inputs simulated and recorded
    pub success: usize,
    /// Inputs skipped or failed
    pub failed: usize,
    /// Inputs considered
    pub total: usize,
}

/// Report of a completed batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Bucket
    pub bucket: String,
    /// IDF prefix (no trailing slash)
    pub idf_prefix: String,
    /// EPW prefix (no trailing slash)
    pub epw_prefix: String,
    /// Total site energy workbook key
    pub results_total_key: String,
    /// Per-area workbook key
    pub results_per_area_key: String,
    /// First processed IDF keys
    pub processed: Vec<String>,
    /// Counters
    pub counts: BatchCounts,
    /// Per-input outcomes
    pub outcomes: Vec<InputOutcome>,
}

/// Index weather files under `epw_prefix` by (scenario, year)
pub async fn index_weather(
    store: &dyn ObjectStore,
    epw_prefix: &str,
) -> Result<HashMap<(Scenario, i32), String>> {
    let mut index = HashMap::new();
    for key in store.list(epw_prefix).await? {
        if let Some(epw) = EpwName::parse(file_name(&key)) {
            index.insert((epw.scenario, epw.year), key);
        }
    }
    Ok(index)
}

/// Sorted `.idf` keys under `idf_prefix`
pub async fn list_inputs(store: &dyn ObjectStore, idf_prefix: &str) -> Result<Vec<String>> {
    let mut keys: Vec<String> = store
        .list(idf_prefix)
        .await?
        .into_iter()
        .filter(|k| k.to_lowercase().ends_with(".idf"))
        .collect();
    keys.sort();
    Ok(keys)
}

/// Runs simulation batches against one object store
pub struct SimulationBatch {
    config: Arc<EngineConfig>,
    store: Arc<dyn ObjectStore>,
    runner: EnergyPlusRunner,
    total: ResultsWorkbook,
    per_area: ResultsWorkbook,
}

impl SimulationBatch {
    /// Create a batch runner
    pub fn new(config: Arc<EngineConfig>, store: Arc<dyn ObjectStore>) -> Self {
        let runner = EnergyPlusRunner::new(config.energyplus_exe.clone(), config.run_timeout);
        let total = ResultsWorkbook::new(config.total_results_key.clone());
        let per_area = ResultsWorkbook::new(config.per_area_results_key.clone());
        Self {
            config,
            store,
            runner,
            total,
            per_area,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a batch
    ///
    /// # Errors
    /// Fails when no weather file or no input definition is available, when
    /// listing storage fails, and with the input's own error (for example
    /// [`EngineError::Timeout`]) when a single requested input fails or no
    /// input succeeds. Otherwise per-input failures are reported in the
    /// outcomes.
    pub async fn run(&self, request: &BatchRequest) -> Result<BatchReport> {
        let storage = &self.config.storage;
        let store = self.store.as_ref();

        let epw_index = if request.epw_key.is_some() {
            HashMap::new()
        } else {
            let index = index_weather(store, &storage.epw_prefix).await?;
            if index.is_empty() {
                return Err(EngineError::NoWeatherFiles {
                    bucket: storage.bucket.clone(),
                    prefix: storage.epw_prefix.clone(),
                });
            }
            index
        };

        let idf_keys = match &request.idf_key {
            Some(key) => {
                let key = StorageConfig::resolve_key(&storage.idf_prefix, key);
                if !store.exists(&key).await? {
                    return Err(EngineError::NotFound(format!(
                        "s3://{}/{}",
                        storage.bucket, key
                    )));
                }
                vec![key]
            }
            None => list_inputs(store, &storage.idf_prefix).await?,
        };
        if idf_keys.is_empty() {
            return Err(EngineError::NoInputFiles {
                bucket: storage.bucket.clone(),
                prefix: storage.idf_prefix.clone(),
            });
        }

        let explicit_epw = request
            .epw_key
            .as_deref()
            .map(|k| StorageConfig::resolve_key(&storage.epw_prefix, k));

        info!(
            bucket = %storage.bucket,
            inputs = idf_keys.len(),
            weather_files = epw_index.len(),
            "Starting simulation batch"
        );

        let total = idf_keys.len();
        let mut counts = BatchCounts {
            total,
            ..Default::default()
        };
        let mut processed = Vec::new();
        let mut outcomes = Vec::with_capacity(total);
        let mut first_error = None;

        for (i, idf_key) in idf_keys.iter().enumerate() {
            let (outcome, failure) = self
                .run_one(i + 1, total, idf_key, explicit_epw.as_deref(), &epw_index)
                .await;
            match outcome.status {
                OutcomeStatus::Succeeded => {
                    counts.success += 1;
                    processed.push(idf_key.clone());
                }
                OutcomeStatus::Skipped | OutcomeStatus::Failed => counts.failed += 1,
            }
            if first_error.is_none() {
                first_error = failure;
            }
            outcomes.push(outcome);
        }

        // A single requested input, or a batch where nothing succeeded, fails
        // with the input's own error.
        if request.idf_key.is_some() || counts.success == 0 {
            if let Some(e) = first_error {
                error!(
                    failed = counts.failed,
                    total = counts.total,
                    "Simulation batch failed: {}",
                    e
                );
                return Err(e);
            }
        }

        info!(
            success = counts.success,
            failed = counts.failed,
            total = counts.total,
            "Simulation batch finished"
        );

        processed.truncate(PROCESSED_PREVIEW);
        Ok(BatchReport {
            bucket: storage.bucket.clone(),
            idf_prefix: storage.idf_prefix.trim_end_matches('/').to_string(),
            epw_prefix: storage.epw_prefix.trim_end_matches('/').to_string(),
            results_total_key: self.total.key().to_string(),
            results_per_area_key: self.per_area.key().to_string(),
            processed,
            counts,
            outcomes,
        })
    }

    /// Outcome of one input, plus the error when it did not succeed
    async fn run_one(
        &self,
        position: usize,
        total: usize,
        idf_key: &str,
        explicit_epw: Option<&str>,
        epw_index: &HashMap<(Scenario, i32), String>,
    ) -> (InputOutcome, Option<EngineError>) {
        let start = Instant::now();
        let mut outcome = InputOutcome {
            idf_key: idf_key.to_string(),
            epw_key: None,
            status: OutcomeStatus::Failed,
            source: None,
            total_site: None,
            per_area: None,
            error: None,
            elapsed_secs: 0.0,
        };
        let name = file_name(idf_key);

        let failed = |mut outcome: InputOutcome, status: OutcomeStatus, e: EngineError| {
            outcome.status = status;
            outcome.error = Some(e.to_string());
            outcome.elapsed_secs = start.elapsed().as_secs_f64();
            (outcome, Some(e))
        };

        // Years without a workbook row are rejected before EnergyPlus runs.
        let parsed = match IdfName::parse(name)
            .and_then(|parsed| row_for_year(parsed.year).map(|_| parsed))
        {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("[{}/{}] {}: {}", position, total, name, e);
                return failed(outcome, OutcomeStatus::Failed, e);
            }
        };

        let epw_key = match explicit_epw {
            Some(key) => key.to_string(),
            None => match epw_index.get(&(parsed.scenario, parsed.year)) {
                Some(key) => key.clone(),
                None => {
                    warn!(
                        "No EPW for {} -> ({}, {}); skipping",
                        name, parsed.scenario, parsed.year
                    );
                    let e = EngineError::NoWeatherMatch {
                        scenario: parsed.scenario.to_string(),
                        year: parsed.year,
                    };
                    return failed(outcome, OutcomeStatus::Skipped, e);
                }
            },
        };
        outcome.epw_key = Some(epw_key.clone());

        info!("[{}/{}] {} x {}", position, total, name, file_name(&epw_key));

        match self.simulate(idf_key, &epw_key, &parsed).await {
            Ok(metrics) => {
                info!(
                    "    -> OK (src={:?}, total_site={:?}, per_area={:?})",
                    metrics.source, metrics.total_site, metrics.per_area
                );
                outcome.status = OutcomeStatus::Succeeded;
                outcome.source = Some(metrics.source);
                outcome.total_site = metrics.total_site;
                outcome.per_area = metrics.per_area;
                outcome.elapsed_secs = start.elapsed().as_secs_f64();
                (outcome, None)
            }
            Err(e) => {
                error!("[{}/{}] {}: {}", position, total, name, e);
                failed(outcome, OutcomeStatus::Failed, e)
            }
        }
    }

    async fn simulate(&self, idf_key: &str, epw_key: &str, parsed: &IdfName) -> Result<SiteEnergy> {
        let run_dir = tempfile::Builder::new().prefix(RUN_DIR_PREFIX).tempdir()?;
        let result = self.simulate_in(run_dir.path(), idf_key, epw_key, parsed).await;

        if self.config.keep_outputs {
            let kept: PathBuf = run_dir.keep();
            info!("Keeping outputs in {}", kept.display());
        }
        result
    }

    async fn simulate_in(
        &self,
        run_dir: &Path,
        idf_key: &str,
        epw_key: &str,
        parsed: &IdfName,
    ) -> Result<SiteEnergy> {
        let store = self.store.as_ref();
        let idf_path = run_dir.join(file_name(idf_key));
        let epw_path = run_dir.join(file_name(epw_key));

        store.download_to_file(idf_key, &idf_path).await?;
        store.download_to_file(epw_key, &epw_path).await?;

        self.runner.run(&idf_path, &epw_path, run_dir).await?;

        // SQLite and CSV parsing are blocking.
        let outdir = run_dir.to_path_buf();
        let metrics = tokio::task::spawn_blocking(move || extract_metrics(&outdir)).await?;
        if !metrics.has_any() {
            return Err(EngineError::MissingMetrics);
        }

        let climate = parsed.scenario.undotted();
        self.total
            .record(store, climate, &parsed.aging, parsed.year, metrics.total_site)
            .await?;
        self.per_area
            .record(store, climate, &parsed.aging, parsed.year, metrics.per_area)
            .await?;

        Ok(metrics)
    }
}
