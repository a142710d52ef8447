use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use config::{AppConfig, Backend};
use services::{
    capability_service::CapabilityUrlService,
    clock::SystemClock,
    gateway::ObjectGateway,
    memory_store::MemoryStore,
    object_store::ObjectStore,
    remote_fetch::RemoteFetcher,
    storage_service::StorageService,
    token_codec::TokenCodec,
};

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting object-gateway with config: {:?}", cfg);

    // --- Object store ---
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        Backend::Disk => {
            let storage = open_disk_store(&cfg).await?;
            if migrate {
                tracing::info!("Database migration complete.");
                return Ok(());
            }
            Arc::new(storage)
        }
        Backend::Memory => {
            if migrate {
                tracing::info!("Memory backend has no schema; nothing to migrate.");
                return Ok(());
            }
            tracing::warn!("Using in-memory backend; objects are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // --- Capability URLs + remote fetch ---
    let codec = TokenCodec::new(&cfg.signing_secret)
        .map_err(|e| anyhow::anyhow!("building token codec: {}", e))?;
    let capabilities = CapabilityUrlService::new(codec, Arc::new(SystemClock));
    let fetcher = RemoteFetcher::new(cfg.fetch_limits()).context("building HTTP client")?;

    let gateway = ObjectGateway::new(store, capabilities, fetcher)
        .with_max_signed_ttl(cfg.max_signed_ttl_secs);

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(gateway);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the payload directory and the SQLite file if needed, then apply the schema.
async fn open_disk_store(cfg: &AppConfig) -> Result<StorageService> {
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {:?}", parent))?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database URL `{}`", db_url))?
        .create_if_missing(true);
    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("connecting to SQLite")?;

    let storage = StorageService::new(Arc::new(db), cfg.storage_dir.clone());
    storage.migrate().await.context("applying schema")?;
    Ok(storage)
}
