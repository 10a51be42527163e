use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

mod cli;

use eventgate_common::SettingsPatch;
use eventgate_core::upstream::{BackendExecutorConfig, WreqBackendExecutor};
use eventgate_core::Gateway;
use eventgate_storage::{PoolManager, SeaOrmStorage, Storage};

use crate::cli::{Cli, env_patch};

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("eventgate failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let mut patch = SettingsPatch::default();
    patch.overlay(env_patch());
    patch.overlay(cli.patch());
    let settings = patch.into_settings()?;

    let pool = Arc::new(PoolManager::new(&settings.dsn, settings.pool));
    pool.connect().await?;
    info!(dsn = %settings.dsn, "db connected");

    let storage = SeaOrmStorage::new(pool.clone());
    storage.sync().await?;
    info!("schema synced");

    // Periodic pool recycling keeps connect-time credentials fresh even
    // while acquisitions are rare.
    {
        let pool = pool.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                if let Err(err) = pool.recycle_if_due().await {
                    warn!(error = %err, "pool recycle failed");
                }
            }
        });
    }

    let storage: Arc<dyn Storage> = Arc::new(storage);
    let executor = Arc::new(WreqBackendExecutor::new(BackendExecutorConfig::default())?);
    let gateway = Gateway::new(&settings, storage, executor);
    let app = gateway.router();

    let bind = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(bind = %bind, "eventgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("eventgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("ctrl-c handler unavailable, running until killed");
        std::future::pending::<()>().await;
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("eventgate=info,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
