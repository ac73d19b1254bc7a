use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::domain::{CuratedFeed, EventCategory, EventQuery};
use crate::server::router::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsParams {
    pub location: Option<String>,
    pub limit: Option<usize>,
    pub date_range: Option<String>,
    /// When true, kick off a background rebuild after serving the cache.
    #[serde(default)]
    pub refresh: bool,
}

/// The response envelope around a cached feed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    #[serde(flatten)]
    pub feed: CuratedFeed,
    /// When the cache row was written; `None` means no build has finished
    /// for these parameters yet.
    pub updated_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
    pub refresh_triggered: bool,
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn events(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(params): Query<EventsParams>,
) -> impl IntoResponse {
    let category = EventCategory::from_vendor(&category);
    let location = params
        .location
        .unwrap_or_else(|| state.config.default_location.clone());

    let mut query = EventQuery::new(category, location);
    query.providers = state.provider_ids.clone();
    if let Some(limit) = params.limit {
        query.limit = limit.clamp(1, 500);
    }
    if let Some(range) = params.date_range {
        query.date_range = range;
    }

    // A broken cache read degrades to the same empty envelope as a feed
    // that has never been built; the read path never hard-fails.
    let cached = state.store.get(&query).unwrap_or_else(|e| {
        warn!("cache read failed, serving empty feed: {}", e);
        None
    });

    // Serving never waits on a build: a refresh request is acknowledged by
    // flag and runs in the background.
    let refresh_triggered = params.refresh && state.coordinator.trigger(query.clone()).is_some();

    let response = match cached {
        Some(entry) => EventsResponse {
            feed: entry.payload,
            updated_at: Some(entry.updated_at),
            is_stale: entry.is_stale,
            refresh_triggered,
        },
        None => EventsResponse {
            feed: CuratedFeed::empty(),
            updated_at: None,
            is_stale: true,
            refresh_triggered,
        },
    };

    Json(response).into_response()
}

pub async fn metrics_text(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (
            StatusCode::NOT_FOUND,
            "metrics exporter not installed".to_string(),
        )
            .into_response(),
    }
}
