use anyhow::{Context, Result};
use clap::Parser;
use job_pilot::cli::{handle_command, Cli};
use job_pilot::config::EnvironmentConfig;
use job_pilot::storage::{GcsStore, GcsTokenProvider, LocalStore, ObjectStore};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match std::env::var("JOBPILOT_LOG_FILE") {
        Ok(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file: {}", path))?;

            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(Arc::new(file))
                        .with_current_span(false)
                        .with_span_list(false),
                )
                .with(filter)
                .init();
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }

    Ok(())
}

/// The store is constructed once here and handed to everything that needs
/// it. JOBPILOT_LOCAL_BUCKET points at a directory instead of GCS for
/// offline use.
fn build_store(config: &EnvironmentConfig) -> Result<Arc<dyn ObjectStore>> {
    if let Ok(dir) = std::env::var("JOBPILOT_LOCAL_BUCKET") {
        info!("Using local object store at {}", dir);
        return Ok(Arc::new(LocalStore::new(PathBuf::from(dir))));
    }

    let tokens = GcsTokenProvider::from_key_file(&config.remote.credentials_path)?;
    let store = GcsStore::new(config.remote.bucket.clone(), tokens)?;
    info!("Using GCS bucket {}", config.remote.bucket);
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cli = Cli::parse();

    let config = EnvironmentConfig::load()?;
    config.ensure_directories().await?;

    info!("Database replica: {}", config.database_path.display());
    info!("Remote object: {}", config.remote.database_object);

    let store = build_store(&config)?;

    handle_command(cli, config, store).await
}
