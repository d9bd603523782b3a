//! Engine configuration
//!
//! Storage location, executable and timeout for a simulation batch. Values are
//! resolved once at process start and shared read-only for the process lifetime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default S3-compatible endpoint (MinIO in the compose network)
pub const DEFAULT_S3_ENDPOINT: &str = "http://minio:9000";

/// Default bucket name
pub const DEFAULT_BUCKET: &str = "mmstore";

/// Default key prefix for input definition files
pub const DEFAULT_IDF_PREFIX: &str = "output_idf_files/";

/// Default key prefix for weather files
pub const DEFAULT_EPW_PREFIX: &str = "weather/epw/";

/// Default EnergyPlus executable name (resolved via PATH)
pub const DEFAULT_ENERGYPLUS_EXE: &str = "energyplus";

/// Default per-invocation timeout (seconds)
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 3600;

/// Workbook key for total site energy results
pub const TOTAL_XLSX_KEY: &str = "results_total_site_energy.xlsx";

/// Workbook key for site energy per building area results
pub const PER_AREA_XLSX_KEY: &str = "results_site_energy_per_area.xlsx";

/// Object storage connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Endpoint URL of the S3-compatible service
    pub endpoint: String,

    /// Access key
    pub access_key: String,

    /// Secret key
    #[serde(skip_serializing)]
    pub secret_key: String,

    /// Signing region
    pub region: String,

    /// Bucket holding inputs, weather files and results
    pub bucket: String,

    /// Key prefix for IDF files
    pub idf_prefix: String,

    /// Key prefix for EPW files
    pub epw_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_S3_ENDPOINT.to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            idf_prefix: DEFAULT_IDF_PREFIX.to_string(),
            epw_prefix: DEFAULT_EPW_PREFIX.to_string(),
        }
    }
}

impl StorageConfig {
    /// Set endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set credentials
    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = access_key.into();
        self.secret_key = secret_key.into();
        self
    }

    /// Set bucket
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Set IDF prefix
    pub fn with_idf_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.idf_prefix = prefix.into();
        self
    }

    /// Set EPW prefix
    pub fn with_epw_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.epw_prefix = prefix.into();
        self
    }

    /// Resolve a key given by a caller against a prefix.
    ///
    /// Bare file names are placed under `prefix`; anything containing a `/`
    /// is taken as a full key.
    pub fn resolve_key(prefix: &str, key: &str) -> String {
        if key.contains('/') || prefix.is_empty() {
            key.to_string()
        } else if prefix.ends_with('/') {
            format!("{}{}", prefix, key)
        } else {
            format!("{}/{}", prefix, key)
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Object storage settings
    pub storage: StorageConfig,

    /// EnergyPlus executable
    pub energyplus_exe: PathBuf,

    /// Maximum wall-clock time per EnergyPlus invocation
    pub run_timeout: Duration,

    /// Keep per-run output directories instead of deleting them
    pub keep_outputs: bool,

    /// Key of the total site energy workbook
    pub total_results_key: String,

    /// Key of the per-area workbook
    pub per_area_results_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            energyplus_exe: PathBuf::from(DEFAULT_ENERGYPLUS_EXE),
            run_timeout: Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS),
            keep_outputs: false,
            total_results_key: TOTAL_XLSX_KEY.to_string(),
            per_area_results_key: PER_AREA_XLSX_KEY.to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a config with the given storage settings
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            ..Default::default()
        }
    }

    /// Set EnergyPlus executable
    pub fn with_executable(mut self, exe: impl Into<PathBuf>) -> Self {
        self.energyplus_exe = exe.into();
        self
    }

    /// Set run timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Keep output directories
    pub fn with_keep_outputs(mut self, keep: bool) -> Self {
        self.keep_outputs = keep;
        self
    }
}

/// Parse a boolean flag the way the deployment scripts write them (`1`, `true`, `yes`)
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
