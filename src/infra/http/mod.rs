pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router};
pub use middleware::RequestContext;

use axum::{
    Router,
    http::{StatusCode, Uri},
    middleware as axum_middleware,
    response::IntoResponse,
};

use api::error::ApiError;
use middleware::{log_responses, set_request_context};

/// Full application router with request logging.
pub fn build_router(state: ApiState) -> Router {
    build_api_router(state)
        .fallback(route_not_found)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn route_not_found(uri: Uri) -> impl IntoResponse {
    ApiError::new(StatusCode::NOT_FOUND, format!("Route not found: {uri}"))
}
