use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use envelope::{
    api, auth,
    config::AppConfig,
    state::AppState,
    store::{snapshot::StoreSnapshot, MemoryStore, Store},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "envelope=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting envelope...");

    let config = AppConfig::from_env();
    let auth_config = Arc::new(auth::AuthConfig::from_env());

    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &config.seed_file {
        let snapshot = StoreSnapshot::load(path).inspect_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to read seed file");
        })?;
        store.import_snapshot(snapshot).await?;
        tracing::info!(path = %path.display(), "Store seeded");
    }

    let state = Arc::new(AppState::new(store, config.clone()));

    // Prune stale reaction windows in the background
    state.reactions.spawn_cleanup();

    let app = api::router(state.clone(), auth_config).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on http://{}", config.bind_addr);

    let rooms = state.rooms.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
            rooms.shutdown().await;
        })
        .await?;

    Ok(())
}
