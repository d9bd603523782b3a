//! Error types for the simulation engine

use std::time::Duration;
use thiserror::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while running a simulation batch
#[derive(Error, Debug)]
pub enum EngineError {
    /// S3 error
    #[error("S3 error: {0}")]
    S3(#[from] aws_sdk_s3::Error),

    /// Generic object storage error (byte streams, in-memory store, etc.)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error while reading `eplusout.sql`
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// CSV error while reading tabular reports
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Result workbook could not be read or written
    #[error("Workbook error: {0}")]
    Workbook(String),

    /// Artifact file name does not follow the naming scheme
    #[error("Unrecognized file name: {0}")]
    InvalidName(String),

    /// Year has no row in the results workbook
    #[error("Year {0} outside [{min}, {max}]", min = crate::workbook::YEARS_START, max = crate::workbook::YEARS_END)]
    YearOutOfRange(i32),

    /// Object not found in storage
    #[error("Object not found: {0}")]
    NotFound(String),

    /// No weather files under the EPW prefix
    #[error("No EPWs under s3://{bucket}/{prefix}")]
    NoWeatherFiles {
        /// Bucket that was listed
        bucket: String,
        /// Prefix that was listed
        prefix: String,
    },

    /// No input definitions under the IDF prefix
    #[error("No IDFs under s3://{bucket}/{prefix}")]
    NoInputFiles {
        /// Bucket that was listed
        bucket: String,
        /// Prefix that was listed
        prefix: String,
    },

    /// No weather file matches the input's scenario and year
    #[error("No EPW for ({scenario}, {year})")]
    NoWeatherMatch {
        /// Climate scenario
        scenario: String,
        /// Simulation year
        year: i32,
    },

    /// Blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Timeout
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// EnergyPlus exited with a non-zero status
    #[error("EnergyPlus failed ({code:?}) for:\n  {input}\nSTDOUT:\n{stdout}\nSTDERR:\n{stderr}")]
    Simulation {
        /// Exit code (None if terminated by a signal)
        code: Option<i32>,
        /// Input file name
        input: String,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// Neither metric could be extracted from the output directory
    #[error("Failed to extract metrics; ensure ABUPS tables are produced.")]
    MissingMetrics,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a workbook error
    pub fn workbook(msg: impl Into<String>) -> Self {
        Self::Workbook(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error is the run timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
