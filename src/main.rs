use anyhow::Result;
use dav_gateway::{
    config::{AppConfig, Backend},
    routes::routes,
    services::{
        background::Detached,
        edge_cache::MemoryEdgeCache,
        memory_store::MemoryObjectStore,
        object_store::ObjectStore,
        sqlite_store::SqliteObjectStore,
    },
    state::AppState,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting dav-gateway with config: {:?}", cfg);

    // --- Initialize object store ---
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        Backend::Sqlite => {
            let store = open_sqlite_store(&cfg).await?;
            if migrate {
                tracing::info!("Database migration complete.");
                return Ok(()); // exit after migration
            }
            Arc::new(store)
        }
        Backend::Memory => {
            if migrate {
                anyhow::bail!("--migrate requires the sqlite backend");
            }
            tracing::warn!("Using in-memory backend; objects are lost on restart");
            Arc::new(MemoryObjectStore::new())
        }
    };

    // --- Cache + background tasks ---
    let tasks = Detached::new();
    let cache = Arc::new(MemoryEdgeCache::new(cfg.cache_capacity));
    let state = AppState::new(store, cache, tasks.clone());

    // --- Build router ---
    let app = routes::app(state, cfg.max_upload_bytes);

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
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Let pending cache evictions finish ---
    tracing::info!("Waiting for {} background task(s)", tasks.pending());
    tasks.drain().await;

    Ok(())
}

/// Create directories, connect the pool and apply the schema.
async fn open_sqlite_store(cfg: &AppConfig) -> Result<SqliteObjectStore> {
    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    let in_memory = db_path.starts_with(":memory:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if !in_memory {
        // Create parent directory if needed
        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        // SQLx does not create the file itself
        match fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path)
        {
            Ok(_) => tracing::debug!("File can be created/opened successfully."),
            Err(e) => tracing::warn!("Failed to open file manually: {}", e),
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    let store = SqliteObjectStore::new(db, cfg.storage_dir.clone());
    store.migrate().await?;
    Ok(store)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl-c: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Received termination signal, shutting down");
}
