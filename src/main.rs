//! freifahren-sync service: keeps the line risk snapshot fresh and serves it
//! together with the merged report windows.

use freifahren_sync::config::EngineConfig;
use freifahren_sync::engine::Engine;
use freifahren_sync::fetch::HttpTransport;
use freifahren_sync::store::{MemoryStore, RevalidationStore, SqliteStore};
use freifahren_sync::web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("freifahren_sync=info".parse()?))
        .init();

    // Load configuration
    let cfg = EngineConfig::load();
    tracing::info!("Starting freifahren-sync on port {}...", cfg.http_port);
    tracing::info!("Using API at {}", cfg.api_url);

    // Validator store
    let store: Arc<dyn RevalidationStore> = if cfg.db_path.is_empty() {
        tracing::info!("No FF_DB_PATH set, keeping validators in memory");
        Arc::new(MemoryStore::new())
    } else {
        tracing::info!("Using database at {}", cfg.db_path);
        Arc::new(SqliteStore::new(&cfg.db_path)?)
    };

    let transport = Arc::new(HttpTransport::new(cfg.request_timeout())?);
    let interval = cfg.refresh_interval();
    let engine = Arc::new(Engine::new(cfg, transport, store));

    // First activation populates the snapshot before the schedule takes over
    if let Err(e) = engine.activate().await {
        tracing::warn!("Initial risk refresh failed, serving an empty snapshot: {}", e);
    }
    engine.start_periodic_refresh(interval);

    let server = Server::new(engine.clone());
    let served = server.start().await;

    engine.shutdown().await;
    tracing::info!("Refresh loop stopped");

    served
}
