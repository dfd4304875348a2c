use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::application::auth::{AuthError, Principal};
use crate::cache::CacheScope;

use super::error::ApiError;
use super::state::ApiState;

/// Cookie consulted when no `Authorization` header is sent.
pub const TOKEN_COOKIE: &str = "token";

/// Authenticate the caller and attach its [`Principal`] and [`CacheScope`].
pub async fn protect_route(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_token(request.headers()) {
        Some(token) => token,
        None => return ApiError::unauthorized().into_response(),
    };

    let principal = match state.auth.authenticate(&token).await {
        Ok(principal) => principal,
        Err(AuthError::UserNotFound) => return ApiError::user_not_found().into_response(),
        Err(AuthError::Repo(err)) => {
            return ApiError::internal("infra::http::api::protect_route", &err).into_response();
        }
        Err(err) => {
            debug!(target = "planity::auth", error = %err, "Rejected access token");
            return ApiError::unauthorized().into_response();
        }
    };

    request.extensions_mut().insert(principal.cache_scope());
    request.extensions_mut().insert(principal.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(principal);
    response
}

/// Key cached responses by the individual caller, even for administrators.
///
/// Layer outside the cache on routes whose payload is personal.
pub async fn per_user_cache_scope(mut request: Request<Body>, next: Next) -> Response {
    let scope = request
        .extensions()
        .get::<Principal>()
        .map(|principal| CacheScope::user(principal.user_id.clone()));
    if let Some(scope) = scope {
        request.extensions_mut().insert(scope);
    }
    next.run(request).await
}

/// Bearer header first, then the `token` cookie.
pub(crate) fn extract_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| {
        CookieJar::from_headers(headers)
            .get(TOKEN_COOKIE)
            .map(|cookie| cookie.value().trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?.trim();
    (!bearer.is_empty()).then(|| bearer.to_string())
}
