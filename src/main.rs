use anyhow::Result;
use axum::{Router, extract::DefaultBodyLimit};
use std::{io::ErrorKind, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::EnvFilter;

use image_store::{
    config::{AppConfig, StoreBackend},
    db,
    repository::image_repository::ImageRepository,
    routes,
    services::image_service::ImageService,
    state::AppState,
    store::{ObjectStore, memory::MemoryObjectStore, s3::S3ObjectStore},
};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Headroom for the multipart envelope around the payload itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting image-store with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db = db::connect(&cfg.database_url).await?;

    // --- Handle migration mode ---
    if migrate {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize object store backend ---
    let store: Arc<dyn ObjectStore> = match cfg.store.backend {
        StoreBackend::S3 => Arc::new(S3ObjectStore::new(&cfg.store).await),
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory object store; uploads will not survive a restart");
            Arc::new(MemoryObjectStore::new())
        }
    };

    // --- Initialize core service ---
    let repo = ImageRepository::new(db.clone());
    let service = Arc::new(ImageService::new(
        repo,
        store.clone(),
        cfg.limits.clone(),
        cfg.store.url_ttl(),
    ));

    // --- Build router ---
    let body_limit = (cfg.limits.max_upload_bytes + MULTIPART_OVERHEAD_BYTES) as usize;
    let state = AppState { service, store, db };
    let app: Router = routes::routes::routes()
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

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
