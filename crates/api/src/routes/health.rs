//! Liveness endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::{AppState, Backend};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Events and cart clears not yet handed off by the background queue.
    pub pending_tasks: usize,
}

/// GET /health
pub async fn check<B: Backend>(State(state): State<Arc<AppState<B>>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        pending_tasks: state.tasks.pending(),
    })
}
