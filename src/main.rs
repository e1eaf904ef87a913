//! Company Finder backend entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use company_finder::config::Config;
use company_finder::db::{self, PostgrestRegistry, RegistryStore, Repository};
use company_finder::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Company Finder backend");
    tracing::info!("Bind address: {}", config.bind_addr);

    let store: Arc<dyn RegistryStore> = match &config.remote {
        Some(remote) => {
            tracing::info!("Using hosted registry at {}", remote.url);
            Arc::new(PostgrestRegistry::new(&remote.url, remote.api_key.clone())?)
        }
        None => {
            tracing::info!("Database path: {:?}", config.db_path);
            let pool = db::init_database(&config.db_path).await?;
            Arc::new(Repository::new(pool))
        }
    };

    let state = AppState {
        store,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
}
