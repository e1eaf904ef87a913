//! Company Finder
//!
//! A read-only REST backend over a company registry, plus the client library
//! that drives search, paging, detail lookups and CSV export against it.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod export;
pub mod models;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::RegistryStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RegistryStore>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/companies", get(api::list_companies))
        .route("/companies/", get(api::missing_company_id))
        .route("/companies/{id}", get(api::get_company))
        .route("/export", get(api::export_companies));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
