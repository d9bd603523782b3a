//! # EnergySim Adapter
//!
//! HTTP front end that turns simulation requests into runs and executes them
//! one at a time through the EnergySim engine.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum)              RunManager                    Engine
//! ├── /model/request  ──▶  PENDING                       │
//! ├── /model/initialize ─▶ INITIALISED                   │
//! ├── /model/run  ──────▶  QUEUED ── worker permit ──▶  SimulationBatch
//! ├── /model/status        RUNNING                       (EnergyPlus subprocess)
//! ├── /model/results  ◀──  SUCCEEDED / ERROR  ◀──────────┘
//! └── /model/remove        (abort + forget)
//!
//! RegistryClient ── heartbeat ──▶ model registry
//! ```
//!
//! Only one simulation holds the worker at a time; further runs queue.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod registry;
pub mod runs;
pub mod server;

// Configuration
pub use config::{AdapterArgs, EngineArgs, RegistryArgs};

// Error handling
pub use error::{AdapterError, Result};

// Service registry
pub use registry::{RegistryApi, RegistryClient};

// Run lifecycle
pub use runs::{EngineExecutor, RunManager, RunRecord, RunState, SimulationExecutor};

// HTTP surface
pub use server::{router, serve, AppState};
