use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use diecast_inventory::config::{AssetBackend, Config};
use diecast_inventory::db::{create_pool, run_migrations};
use diecast_inventory::server;
use diecast_inventory::services::Inventory;
use diecast_inventory::storage::{LocalBackend, R2Backend, StorageBackend};
use diecast_inventory::store::{ItemStore, MemoryItemStore, PgItemStore};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diecast_inventory=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting diecast-inventory gRPC server...");

    let store: Arc<dyn ItemStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = create_pool(url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?;
            run_migrations(&pool).await?;
            tracing::info!("Database connection established");
            Arc::new(PgItemStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping items in memory only");
            Arc::new(MemoryItemStore::new())
        }
    };

    let assets: Arc<dyn StorageBackend> = match config.asset_backend {
        AssetBackend::Local => Arc::new(LocalBackend::new(&config.asset_dir).await?),
        AssetBackend::R2 => {
            let settings = config
                .r2
                .as_ref()
                .context("R2 settings missing for ASSET_BACKEND=r2")?;
            Arc::new(R2Backend::new(settings)?)
        }
    };
    tracing::info!("Image storage: {}", assets.location());

    tokio::fs::create_dir_all(&config.staging_dir)
        .await
        .with_context(|| format!("Failed to create staging dir {:?}", config.staging_dir))?;

    let inventory = Inventory::new(store, assets, config.staging_dir.clone())
        .with_limits(config.max_upload_bytes, config.max_archive_bytes)
        .with_extraction_limit(config.max_extracted_bytes);

    // Inline images arrive inside a single message
    let max_message_size = config.max_upload_bytes + 64 * 1024;

    // Parse server address
    let addr: SocketAddr = config.server_addr().parse()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    // Build and run server with gRPC-Web support
    server::serve(
        inventory,
        &config.asset_url_prefix,
        max_message_size,
        listener,
        async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        },
    )
    .await
}
