//! Room registry binary entrypoint wiring storage, the registry actor, REST, WebSocket, and SSE.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dating_show_registry::{
    config::{AppConfig, StorageConfig},
    dao::kv_store::{KvStore, file::FileKvStore, memory::MemoryKvStore},
    routes,
    services::storage_monitor,
    state::{AppState, SharedState, clock::SystemClock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let storage = match config.storage.clone() {
        Some(storage) => storage,
        None => storage_from_env(),
    };
    let store = open_store(storage).await?;
    info!(backend = store.backend(), "storage backend ready");

    let app_state = AppState::bootstrap(config.registry.clone(), store, Arc::new(SystemClock)).await;

    tokio::spawn(storage_monitor::run(
        app_state.clone(),
        storage_monitor::HEALTH_POLL_INTERVAL,
    ));
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick CouchDB when `COUCH_BASE_URL` is set, the file backend otherwise.
fn storage_from_env() -> StorageConfig {
    #[cfg(feature = "couch-store")]
    {
        use dating_show_registry::dao::kv_store::couchdb::CouchConfig;

        if let Ok(couch) = CouchConfig::from_env() {
            return StorageConfig::Couch {
                base_url: couch.base_url,
                database: couch.database,
                username: couch.username,
                password: couch.password,
            };
        }
    }
    StorageConfig::default()
}

/// Open the configured storage backend.
async fn open_store(storage: StorageConfig) -> anyhow::Result<Arc<dyn KvStore>> {
    match storage {
        StorageConfig::Memory => {
            warn!("memory storage selected; rooms will not survive a restart");
            Ok(Arc::new(MemoryKvStore::new()))
        }
        StorageConfig::File { dir } => {
            let store = FileKvStore::open(&dir)
                .await
                .with_context(|| format!("opening file storage at `{}`", dir.display()))?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "couch-store")]
        StorageConfig::Couch {
            base_url,
            database,
            username,
            password,
        } => {
            use dating_show_registry::{
                config::couch_credentials,
                dao::kv_store::couchdb::{CouchConfig, CouchKvStore},
            };

            let mut couch = CouchConfig::new(base_url, database);
            if let Some((username, password)) = couch_credentials(username, password) {
                couch = couch.with_credentials(username, password);
            }
            let store = CouchKvStore::connect(couch)
                .await
                .context("connecting to CouchDB")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "couch-store"))]
        StorageConfig::Couch { .. } => {
            anyhow::bail!("CouchDB storage requires the `couch-store` feature")
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
