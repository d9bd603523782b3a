//! Adapter configuration
//!
//! Every setting is a CLI flag backed by an environment variable, so a
//! container image carries defaults while deployments override them without a
//! rebuild. Values are parsed once at startup.

use clap::{ArgAction, Args};
use energysim_engine::config::{
    parse_flag, DEFAULT_BUCKET, DEFAULT_ENERGYPLUS_EXE, DEFAULT_EPW_PREFIX, DEFAULT_IDF_PREFIX,
    DEFAULT_RUN_TIMEOUT_SECS, DEFAULT_S3_ENDPOINT,
};
use energysim_engine::{EngineConfig, StorageConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Default adapter port
pub const DEFAULT_ADAPTER_PORT: u16 = 8000;

/// Default model name reported to the registry
pub const DEFAULT_MODEL_NAME: &str = "energy_sim_model";

/// Default model description reported to the registry
pub const DEFAULT_MODEL_DESCRIPTION: &str =
    "Runs EnergyPlus over IDFs from MinIO and writes XLSX results";

fn parse_flag_value(value: &str) -> Result<bool, String> {
    Ok(parse_flag(value))
}

/// Simulation engine settings
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// EnergyPlus executable (name on PATH or absolute path)
    #[arg(long, env = "ENERGYPLUS_EXE", default_value = DEFAULT_ENERGYPLUS_EXE)]
    pub energyplus_exe: PathBuf,

    /// S3-compatible endpoint URL
    #[arg(long, env = "S3_ENDPOINT", default_value = DEFAULT_S3_ENDPOINT)]
    pub s3_endpoint: String,

    /// S3 access key
    #[arg(long, env = "S3_ACCESS_KEY", default_value = "minioadmin", hide_env_values = true)]
    pub s3_access_key: String,

    /// S3 secret key
    #[arg(long, env = "S3_SECRET_KEY", default_value = "minioadmin", hide_env_values = true)]
    pub s3_secret_key: String,

    /// S3 signing region
    #[arg(long, env = "S3_REGION", default_value = "us-east-1")]
    pub s3_region: String,

    /// Bucket holding inputs, weather files and results
    #[arg(long, env = "S3_BUCKET", default_value = DEFAULT_BUCKET)]
    pub s3_bucket: String,

    /// Key prefix for IDF files
    #[arg(long, env = "S3_IDF_PREFIX", default_value = DEFAULT_IDF_PREFIX)]
    pub s3_idf_prefix: String,

    /// Key prefix for EPW files
    #[arg(long, env = "S3_EPW_PREFIX", default_value = DEFAULT_EPW_PREFIX)]
    pub s3_epw_prefix: String,

    /// Maximum seconds per EnergyPlus invocation
    #[arg(long, env = "RUN_TIMEOUT_SEC", default_value_t = DEFAULT_RUN_TIMEOUT_SECS)]
    pub run_timeout_sec: u64,

    /// Keep per-run output directories (1/true/yes)
    #[arg(
        long,
        env = "KEEP_OUTPUTS",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = parse_flag_value
    )]
    pub keep_outputs: bool,
}

impl EngineArgs {
    /// Build the engine configuration
    pub fn into_config(self) -> EngineConfig {
        let storage = StorageConfig {
            region: self.s3_region,
            ..StorageConfig::default()
        }
        .with_endpoint(self.s3_endpoint)
        .with_credentials(self.s3_access_key, self.s3_secret_key)
        .with_bucket(self.s3_bucket)
        .with_idf_prefix(self.s3_idf_prefix)
        .with_epw_prefix(self.s3_epw_prefix);

        EngineConfig::new(storage)
            .with_executable(self.energyplus_exe)
            .with_timeout(Duration::from_secs(self.run_timeout_sec))
            .with_keep_outputs(self.keep_outputs)
    }
}

/// Service registry settings
#[derive(Args, Debug, Clone)]
pub struct RegistryArgs {
    /// Registry base URL; registration is skipped when unset
    #[arg(long, env = "REGISTRY_ENDPOINT")]
    pub registry_endpoint: Option<String>,

    /// Model name
    #[arg(long, env = "MODEL_NAME", default_value = DEFAULT_MODEL_NAME)]
    pub model_name: String,

    /// Model description (legacy registry API)
    #[arg(long, env = "MODEL_DESCRIPTION", default_value = DEFAULT_MODEL_DESCRIPTION)]
    pub model_description: String,

    /// Model version
    #[arg(long, env = "MODEL_VERSION", default_value = "1.0.0")]
    pub model_version: String,

    /// Worker capacity reported to the registry
    #[arg(long, env = "MODEL_MAX_WORKERS", default_value_t = 1)]
    pub model_max_workers: u32,

    /// Busy workers reported to the registry
    #[arg(long, env = "MODEL_USED_WORKERS", default_value_t = 0)]
    pub model_used_workers: u32,

    /// Public URL of this adapter (overrides host/port resolution)
    #[arg(long, env = "ADAPTER_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Public host of this adapter
    #[arg(long, env = "ADAPTER_PUBLIC_HOST")]
    pub public_host: Option<String>,

    /// Service name of this adapter (fallback public host)
    #[arg(long, env = "ADAPTER_SERVICE")]
    pub service: Option<String>,

    /// Public port of this adapter (defaults to the bind port)
    #[arg(long, env = "ADAPTER_PUBLIC_PORT")]
    pub public_port: Option<u16>,
}

/// HTTP adapter settings
#[derive(Args, Debug, Clone)]
pub struct AdapterArgs {
    /// Host to bind
    #[arg(long, env = "ADAPTER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "ADAPTER_PORT", default_value_t = DEFAULT_ADAPTER_PORT)]
    pub port: u16,

    /// Prefix for generated run ids
    #[arg(long, env = "RUN_ID_PREFIX", default_value = "run")]
    pub run_id_prefix: String,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

impl RegistryArgs {
    /// Base URL other services should use to reach this adapter.
    ///
    /// `ADAPTER_PUBLIC_URL` wins; otherwise `http://<host>:<port>` with host
    /// from `ADAPTER_PUBLIC_HOST`, `ADAPTER_SERVICE` or `<model>-adapter`, and
    /// port from `ADAPTER_PUBLIC_PORT` or the bind port.
    pub fn public_base_url(&self, bind_port: u16) -> String {
        if let Some(url) = self.public_url.as_deref().filter(|u| !u.is_empty()) {
            return url.trim_end_matches('/').to_string();
        }
        let host = self
            .public_host
            .clone()
            .or_else(|| self.service.clone())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| format!("{}-adapter", self.model_name));
        let port = self.public_port.unwrap_or(bind_port);
        format!("http://{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        adapter: AdapterArgs,
    }

    fn parse(args: &[&str]) -> TestCli {
        TestCli::try_parse_from(std::iter::once("energysim-adapter").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--s3-bucket",
            "other",
            "--s3-idf-prefix",
            "idf/",
            "--run-timeout-sec",
            "60",
            "--keep-outputs",
            "yes",
            "--port",
            "9100",
        ]);
        let config = cli.engine.into_config();

        assert_eq!(config.storage.bucket, "other");
        assert_eq!(config.storage.idf_prefix, "idf/");
        assert_eq!(config.run_timeout, Duration::from_secs(60));
        assert!(config.keep_outputs);
        assert_eq!(cli.adapter.port, 9100);
    }

    /// Sets variables for the guard's lifetime and removes them on drop
    struct EnvGuard(Vec<&'static str>);

    impl EnvGuard {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            for (key, value) in vars {
                // SAFETY: only this test touches these variables, and every
                // other parse in this module passes them as flags.
                unsafe { std::env::set_var(key, value) };
            }
            Self(vars.iter().map(|(key, _)| *key).collect())
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for key in &self.0 {
                // SAFETY: see `EnvGuard::set`.
                unsafe { std::env::remove_var(key) };
            }
        }
    }

    #[test]
    fn test_environment_fills_unset_flags() {
        let _env = EnvGuard::set(&[
            ("S3_BUCKET", "env-bucket"),
            ("S3_IDF_PREFIX", "env/idf/"),
        ]);
        let config = parse(&[]).engine.into_config();

        assert_eq!(config.storage.bucket, "env-bucket");
        assert_eq!(config.storage.idf_prefix, "env/idf/");
    }

    fn registry(model: &str) -> RegistryArgs {
        RegistryArgs {
            registry_endpoint: None,
            model_name: model.to_string(),
            model_description: String::new(),
            model_version: "1.0.0".to_string(),
            model_max_workers: 1,
            model_used_workers: 0,
            public_url: None,
            public_host: None,
            service: None,
            public_port: None,
        }
    }

    #[test]
    fn test_public_base_url_defaults_to_service_name() {
        let args = registry("energy_sim_model");
        assert_eq!(
            args.public_base_url(8000),
            "http://energy_sim_model-adapter:8000"
        );
    }

    #[test]
    fn test_public_base_url_precedence() {
        let mut args = registry("m");
        args.service = Some("svc".to_string());
        assert_eq!(args.public_base_url(8000), "http://svc:8000");

        args.public_host = Some("public.example".to_string());
        args.public_port = Some(443);
        assert_eq!(args.public_base_url(8000), "http://public.example:443");

        args.public_url = Some("https://sim.example/".to_string());
        assert_eq!(args.public_base_url(8000), "https://sim.example");
    }
}
