//! EnergySim adapter
//!
//! ## Usage
//!
//! ```bash
//! # Serve the HTTP API (default)
//! energysim-adapter --port 8000
//!
//! # Run one batch over every IDF under the prefix and print the report
//! energysim-adapter batch
//!
//! # Single IDF with an explicit weather file
//! energysim-adapter batch --idf-key RCP45_T1_2050.idf --epw-key Rotterdam_RCP45_2050.epw
//! ```
//!
//! Every flag can also be set through its environment variable
//! (`ENERGYPLUS_EXE`, `S3_ENDPOINT`, `S3_BUCKET`, `ADAPTER_PORT`, ...).

use clap::{Parser, Subcommand};
use energysim_adapter::{
    router, serve, AdapterArgs, AppState, EngineArgs, EngineExecutor, RegistryClient, RunManager,
};
use energysim_engine::{BatchRequest, EngineConfig, S3Store, SimulationBatch};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// EnergySim: EnergyPlus simulations over S3-hosted artifacts
#[derive(Parser)]
#[command(name = "energysim-adapter")]
#[command(about = "HTTP adapter running EnergyPlus simulations one at a time", long_about = None)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(flatten)]
    adapter: AdapterArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (default)
    Serve,

    /// Run a single batch and print the JSON report
    Batch {
        /// IDF to simulate (default: every IDF under the prefix)
        #[arg(long)]
        idf_key: Option<String>,

        /// Weather file (default: resolved from the IDF name)
        #[arg(long)]
        epw_key: Option<String>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            std::env::var("LOG_LEVEL")
                .map_err(|e| e.to_string())
                .and_then(|level| {
                    tracing_subscriber::EnvFilter::try_new(level.to_lowercase())
                        .map_err(|e| e.to_string())
                })
        })
        .unwrap_or_else(|_| "energysim=info,info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Arc::new(cli.engine.into_config());

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config, cli.adapter).await,
        Commands::Batch { idf_key, epw_key } => {
            run_batch(config, BatchRequest { idf_key, epw_key }).await
        }
    }
}

async fn connect_batch(config: Arc<EngineConfig>) -> SimulationBatch {
    info!(
        "🪣 Object storage: {} (bucket {})",
        config.storage.endpoint, config.storage.bucket
    );
    let store = S3Store::connect(&config.storage).await;
    SimulationBatch::new(config, Arc::new(store))
}

/// One-shot batch
async fn run_batch(config: Arc<EngineConfig>, request: BatchRequest) -> anyhow::Result<()> {
    let batch = connect_batch(config).await;
    let report = batch.run(&request).await.map_err(|e| {
        error!("❌ Batch failed: {}", e);
        e
    })?;

    info!(
        "✅ Batch complete: {} succeeded, {} failed, {} total",
        report.counts.success, report.counts.failed, report.counts.total
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// HTTP server mode
async fn run_server(config: Arc<EngineConfig>, args: AdapterArgs) -> anyhow::Result<()> {
    info!("🚀 EnergySim adapter starting");
    info!("⚙️  EnergyPlus: {}", config.energyplus_exe.display());
    info!("⏱️  Run timeout: {:?}", config.run_timeout);

    let batch = connect_batch(config).await;
    let executor = Arc::new(EngineExecutor::new(batch));
    let runs = Arc::new(RunManager::new(executor, args.run_id_prefix.clone()));
    let app = router(AppState::new(Arc::clone(&runs)));

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;

    let heartbeat = match RegistryClient::from_args(&args.registry, args.port)? {
        Some(client) => {
            info!("📇 Registering as {}", client.public_url());
            Some(client.start_heartbeat(move || runs.busy_workers()))
        }
        None => {
            info!("REGISTRY_ENDPOINT not set; skipping registration");
            None
        }
    };

    serve(listener, app, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("🛑 Shutting down...");
    })
    .await?;

    if let Some(task) = heartbeat {
        task.abort();
    }
    info!("✅ Shutdown complete");
    Ok(())
}
