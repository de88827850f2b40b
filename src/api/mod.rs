// Inbound HTTP surface: thin mapping from routes to the proxy cache

use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::market_data::ProxyCache;

pub mod markets;

pub use markets::{ApiError, ErrorBody, MarketsParams, DEFAULT_PAGE, DEFAULT_PER_PAGE, MAX_PER_PAGE};

// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ProxyCache>,
}

impl AppState {
    pub fn new(cache: Arc<ProxyCache>) -> Self {
        Self { cache }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/markets", get(markets::get_markets))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
