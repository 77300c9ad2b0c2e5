//! Gatehouse API server binary.
//!
//! Reads configuration from the environment (and `.env`), lets command-line
//! flags override it, and serves the API until Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use gatehouse_api::config::{ApiConfig, StorageBackend};
use gatehouse_api::{AppState, router};
use gatehouse_core::store::memory::MemoryStore;
use gatehouse_core::store::postgres::PgStore;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "gatehouse_server", about = "Gatehouse auth API server")]
struct Args {
    /// Address to listen on, e.g. `0.0.0.0:8000`.
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Storage backend: `postgres` or `memory`.
    #[arg(long, env = "GATEHOUSE_STORAGE")]
    storage: Option<StorageBackend>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = gatehouse_core::db::DEFAULT_MAX_CONNECTIONS)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,gatehouse_api=debug,gatehouse_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if let Some(storage) = args.storage {
        config.storage = storage;
    }

    info!(
        bind = %config.bind_addr,
        storage = ?config.storage,
        access_ttl_secs = config.auth.access_ttl.num_seconds(),
        refresh_ttl_days = config.auth.refresh_ttl.num_days(),
        "starting gatehouse_server"
    );

    let state = match config.storage {
        StorageBackend::Postgres => {
            let pool = gatehouse_core::db::connect(&config.database_url, args.max_connections).await?;
            info!("running database migrations");
            gatehouse_core::migrate::migrate(&pool).await?;
            AppState::new(config.clone(), Arc::new(PgStore::new(pool)))
        }
        StorageBackend::Memory => {
            warn!("using in-memory storage; all data is lost on exit");
            AppState::new(config.clone(), Arc::new(MemoryStore::new()))
        }
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
