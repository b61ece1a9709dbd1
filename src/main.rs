//! Pollroom binary entrypoint wiring REST, WebSocket, and storage layers.

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pollroom_back::{
    config::AppConfig,
    routes,
    services::{storage_supervisor, sweeper},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let port = config.port;
    let app_state = AppState::new(config);

    spawn_storage_supervisor(app_state.clone());
    tokio::spawn(sweeper::run(app_state.clone()));

    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Keep a MongoDB-backed store connected, degrading the app while it is not.
#[cfg(feature = "mongo-store")]
fn spawn_storage_supervisor(state: SharedState) {
    use std::sync::Arc;

    use pollroom_back::dao::poll_store::{
        PollStore, StorageError,
        mongodb::{MongoConfig, MongoPollStore},
    };

    let uri = state.config().mongo_uri.clone();
    let db_name = state.config().mongo_db.clone();

    tokio::spawn(storage_supervisor::run(state, move || {
        let uri = uri.clone();
        let db_name = db_name.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
            let store = MongoPollStore::connect(config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn PollStore>)
        }
    }));
}

/// Without the Mongo feature, run on the in-memory store.
#[cfg(not(feature = "mongo-store"))]
fn spawn_storage_supervisor(state: SharedState) {
    use std::sync::Arc;

    use pollroom_back::dao::poll_store::{PollStore, StorageError, memory::MemoryPollStore};

    tokio::spawn(storage_supervisor::run(state, move || async move {
        Ok::<_, StorageError>(Arc::new(MemoryPollStore::default()) as Arc<dyn PollStore>)
    }));
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

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
