//! # EnergySim Engine
//!
//! Batch runner for EnergyPlus over artifacts held in S3-compatible storage.
//!
//! ## Architecture
//!
//! ```text
//! SimulationBatch
//! ├── ObjectStore (S3 / MinIO)  ── IDF + EPW in, XLSX results out
//! ├── naming                    ── scenario / aging / year from file names
//! ├── EnergyPlusRunner          ── subprocess, killed on timeout
//! ├── metrics                   ── ABUPS site energy (sql → tab → csv)
//! └── ResultsWorkbook           ── read-modify-write result grids
//! ```
//!
//! EnergyPlus itself is an opaque external executable; this crate only
//! prepares its inputs, bounds its runtime and reads its tabular outputs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod config;
pub mod energyplus;
pub mod error;
pub mod metrics;
pub mod naming;
pub mod storage;
pub mod workbook;

// Batch orchestration
pub use batch::{
    BatchCounts, BatchReport, BatchRequest, InputOutcome, OutcomeStatus, SimulationBatch,
};

// Configuration
pub use config::{EngineConfig, StorageConfig};

// Error handling
pub use error::{EngineError, Result};

// Subprocess execution
pub use energyplus::EnergyPlusRunner;

// Metrics
pub use metrics::{extract_metrics, MetricsSource, SiteEnergy};

// Naming scheme
pub use naming::{EpwName, IdfName, Scenario};

// Storage
pub use storage::{ObjectStore, S3Store};

// Result workbooks
pub use workbook::ResultsWorkbook;
