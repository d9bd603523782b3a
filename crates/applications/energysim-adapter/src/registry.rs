//! Service registry heartbeat
//!
//! Announces this adapter to a model registry. The current registry API is
//! tried first; a 404 from it means an older registry, which gets the legacy
//! payload instead. Registration repeats in the background so a registry
//! restart is picked up without restarting the adapter.

use crate::config::RegistryArgs;
use crate::error::Result;
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Per-request timeout
pub const REGISTRY_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay before re-registering after a success
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Delay before retrying after a failure
pub const RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Routes advertised through the legacy API
pub const ADVERTISED_ENDPOINTS: &[&str] = &[
    "/model/request",
    "/model/initialize/<run_id>",
    "/model/run/<run_id>",
    "/model/status/<run_id>",
    "/model/results/<run_id>",
    "/model/remove/<run_id>",
];

#[derive(Debug, Serialize)]
struct Registration<'a> {
    name: &'a str,
    uri: &'a str,
    version: &'a str,
    max_workers: u32,
    used_workers: u32,
}

#[derive(Debug, Serialize)]
struct LegacyRegistration<'a> {
    name: &'a str,
    description: &'a str,
    url: &'a str,
    endpoints: &'a [&'a str],
}

/// Which registry API accepted the registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryApi {
    /// `POST /registry/`
    Current,
    /// `POST /models/register`
    Legacy,
}

/// Client for one registry
pub struct RegistryClient {
    http: reqwest::Client,
    endpoint: String,
    name: String,
    description: String,
    version: String,
    max_workers: u32,
    used_workers: u32,
    public_url: String,
}

impl RegistryClient {
    /// Create a client, or `None` when no registry endpoint is configured
    pub fn from_args(args: &RegistryArgs, bind_port: u16) -> Result<Option<Self>> {
        let Some(endpoint) = args.registry_endpoint.as_deref().filter(|e| !e.is_empty()) else {
            return Ok(None);
        };

        let http = reqwest::Client::builder().timeout(REGISTRY_TIMEOUT).build()?;

        Ok(Some(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            name: args.model_name.clone(),
            description: args.model_description.clone(),
            version: args.model_version.clone(),
            max_workers: args.model_max_workers,
            used_workers: args.model_used_workers,
            public_url: args.public_base_url(bind_port),
        }))
    }

    /// URL this adapter advertises
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Register once, falling back to the legacy API.
    ///
    /// `busy` is the number of simulations currently running; the reported
    /// used workers never drop below `MODEL_USED_WORKERS`. Returns the API
    /// that accepted the registration, or `None` if both attempts failed.
    pub async fn register(&self, busy: usize) -> Option<RegistryApi> {
        let used_workers = self.used_workers.max(busy as u32);
        match self.register_current(used_workers).await {
            Ok(true) => {
                info!("📇 Registered with registry at {}/registry/", self.endpoint);
                return Some(RegistryApi::Current);
            }
            Ok(false) => {}
            Err(e) => warn!("⚠️  Registry registration failed: {}", e),
        }

        match self.register_legacy().await {
            Ok(()) => {
                info!(
                    "📇 Registered with registry (legacy API) at {}/models/register",
                    self.endpoint
                );
                Some(RegistryApi::Legacy)
            }
            Err(e) => {
                warn!("⚠️  Legacy registry registration failed: {}", e);
                None
            }
        }
    }

    /// `Ok(false)` when the registry does not know the current API
    async fn register_current(&self, used_workers: u32) -> Result<bool> {
        let body = Registration {
            name: &self.name,
            uri: &self.public_url,
            version: &self.version,
            max_workers: self.max_workers,
            used_workers,
        };
        let response = self
            .http
            .post(format!("{}/registry/", self.endpoint))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        response.error_for_status()?;
        Ok(true)
    }

    async fn register_legacy(&self) -> Result<()> {
        let body = LegacyRegistration {
            name: &self.name,
            description: &self.description,
            url: &self.public_url,
            endpoints: ADVERTISED_ENDPOINTS,
        };
        self.http
            .post(format!("{}/models/register", self.endpoint))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Register now and keep re-registering in the background.
    ///
    /// `busy` is sampled before every attempt.
    pub fn start_heartbeat<F>(self, busy: F) -> JoinHandle<()>
    where
        F: Fn() -> usize + Send + 'static,
    {
        tokio::spawn(async move {
            loop {
                let delay = match self.register(busy()).await {
                    Some(_) => HEARTBEAT_INTERVAL,
                    None => {
                        info!("🔁 Retrying registry registration in {:?}", RETRY_INTERVAL);
                        RETRY_INTERVAL
                    }
                };
                tokio::time::sleep(delay).await;
            }
        })
    }
}
