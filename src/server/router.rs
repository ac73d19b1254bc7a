use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cache::{CacheStore, RefreshCoordinator};
use crate::config::AppConfig;
use crate::server::handlers::{events, health, metrics_text};

/// Shared handler state. Everything in here is cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CacheStore>,
    pub coordinator: RefreshCoordinator,
    pub config: Arc<AppConfig>,
    /// Provider tags actually registered at startup; part of the cache key.
    pub provider_ids: Vec<String>,
    pub prometheus: Option<PrometheusHandle>,
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/events/:category", get(events))
        .route("/metrics", get(metrics_text))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
