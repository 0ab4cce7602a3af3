use crate::prediction::PredictionEngine;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

/// Shared handles injected into every handler.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub engine: Arc<PredictionEngine>,
    pub store: Arc<RwLock<AppState>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route(
            "/api/containers/{id}/predictions",
            post(handlers::post_prediction),
        )
        .route(
            "/api/containers/{id}/predictions/latest",
            get(handlers::get_latest_prediction),
        )
        .with_state(state)
}
