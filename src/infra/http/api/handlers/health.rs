//! Health handler

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use crate::infra::http::api::models::HealthResponse;
use crate::infra::http::api::state::ApiState;

/// Liveness plus cache reachability. An unreachable cache does not fail the
/// check: the API keeps serving without it.
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let cache = state.cache_store().health().await;
    Json(HealthResponse {
        status: true,
        cache,
    })
}
