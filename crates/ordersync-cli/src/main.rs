use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ordersync::{router, trigger_sync, AppState, Command, Config};
use ordersync_client::Cafe24Client;
use ordersync_core::{load_config, SyncDeps, SyncService};
use ordersync_db::{
    CustomerRepository, InventoryRepository, OrderLineRepository, SkuRepository, SyncLogRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Setup logging (stderr to keep stdout clean for the JSON summary)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let file_config = load_config(config.config.as_deref()).context("Failed to load config file")?;

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(file_config.db.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let channel = Cafe24Client::new(
        &config.cafe24_mall_id,
        &config.cafe24_access_token,
        config.cafe24_api_version.as_deref(),
        &file_config.http,
    )
    .context("Invalid Cafe24 client configuration")?
    .with_max_pages(file_config.sync.max_pages);

    let deps = SyncDeps {
        channel: Arc::new(channel),
        orders: Arc::new(OrderLineRepository::new(pool.clone())),
        skus: Arc::new(SkuRepository::new(pool.clone())),
        inventory: Arc::new(InventoryRepository::new(pool.clone())),
        customers: Arc::new(CustomerRepository::new(pool.clone())),
    };
    let state = AppState {
        service: Arc::new(SyncService::new(deps, file_config.sync)),
        sync_log: Some(SyncLogRepository::new(pool)),
    };

    match config.command {
        Command::Sync {
            start_date,
            end_date,
        } => {
            sync_once(&state, start_date.as_deref(), end_date.as_deref()).await?;
        }
        Command::Serve { bind } => {
            serve(state, bind).await?;
        }
    }

    Ok(())
}

/// Runs one sync and prints the JSON summary. Exits non-zero when the run failed.
async fn sync_once(
    state: &AppState,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> anyhow::Result<()> {
    let response = trigger_sync(state, start_date, end_date).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    match response.error {
        Some(error) if !response.success => anyhow::bail!(error),
        _ => Ok(()),
    }
}

async fn serve(state: AppState, bind: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")?;

    Ok(())
}
