//! Read-through response cache middleware.
//!
//! Serves cached JSON responses for GET routes and stores fresh 2xx JSON
//! responses on a miss. Any cache failure degrades to running the handler.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{OriginalUri, State},
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use futures::stream;
use http_body_util::BodyExt;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::store::CacheStore;
use super::{METRIC_CACHE_HIT, METRIC_CACHE_MISS};

/// Visibility scope of the caller, inserted by the auth layer.
///
/// Routes whose payload depends on who asks get one cache entry per scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheScope(String);

impl CacheScope {
    /// Admins see every task, so they all share one scope.
    pub fn admin() -> Self {
        Self("admin".to_string())
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Shared state for [`response_cache_layer`].
#[derive(Clone)]
pub struct CacheState {
    store: Arc<CacheStore>,
    ttl: Duration,
    max_body_bytes: usize,
    enabled: bool,
}

impl CacheState {
    pub fn new(store: Arc<CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            ttl: config.default_ttl,
            max_body_bytes: config.max_body_bytes,
            enabled: config.is_enabled(),
        }
    }

    /// Same store, different expiry for the routes this state is layered on.
    pub fn with_ttl(&self, ttl: Duration) -> Self {
        Self {
            ttl,
            ..self.clone()
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }
}

/// Serialized form of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CachedResponse {
    fn from_parts(parts: &axum::http::response::Parts, body: String) -> Self {
        let headers = parts
            .headers
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        Self {
            status: parts.status.as_u16(),
            headers,
            body,
        }
    }

    /// Rebuild the response; `None` if the entry is not a valid 2xx response.
    fn into_response(self) -> Option<Response> {
        let status = StatusCode::from_u16(self.status).ok()?;
        if !status.is_success() {
            return None;
        }

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
            let value = HeaderValue::from_str(&value).ok()?;
            headers.append(name, value);
        }
        Some(response)
    }
}

/// Middleware for read-through response caching.
///
/// Layer it per route with `from_fn_with_state`; the route's TTL comes from
/// the [`CacheState`] it was given.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.enabled || request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = request_key(&request);

    if let Some(cached) = cache.store.get::<CachedResponse>(key.as_str()).await {
        if let Some(response) = cached.into_response() {
            counter!(METRIC_CACHE_HIT).increment(1);
            debug!(target = "planity::cache", key = %key, outcome = "hit", "Serving cached response");
            return response;
        }
        warn!(target = "planity::cache", key = %key, "Ignoring malformed cached response");
    }

    counter!(METRIC_CACHE_MISS).increment(1);
    debug!(target = "planity::cache", key = %key, outcome = "miss", "Cache miss, executing handler");

    let response = next.run(request).await;
    if !should_store_response(&response, cache.max_body_bytes) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match BodyExt::collect(body).await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(
                target = "planity::cache",
                key = %key,
                error = %err,
                "Failed to buffer response body, not caching"
            );
            // Keep the handler's status and headers; the client sees the same
            // body error the uncached path would have produced.
            let failed = stream::once(async move { Err::<Bytes, _>(err) });
            return Response::from_parts(parts, Body::from_stream(failed));
        }
    };

    if let Ok(text) = std::str::from_utf8(&bytes) {
        let cached = CachedResponse::from_parts(&parts, text.to_string());
        if cache
            .store
            .set_with_ttl(key.as_str(), &cached, cache.ttl)
            .await
            .is_success()
        {
            debug!(
                target = "planity::cache",
                key = %key,
                ttl_seconds = cache.ttl.as_secs(),
                "Cached response"
            );
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn request_key(request: &Request<Body>) -> CacheKey {
    let uri = request
        .extensions()
        .get::<OriginalUri>()
        .map(|original| &original.0)
        .unwrap_or_else(|| request.uri());
    let scope = request.extensions().get::<CacheScope>();

    CacheKey::derive_scoped(
        request.method(),
        uri.path(),
        uri.query(),
        scope.map(CacheScope::as_str),
    )
}

/// Only complete 2xx JSON bodies without cookies are stored.
pub fn should_store_response(response: &Response, max_body_bytes: usize) -> bool {
    if !response.status().is_success() {
        return false;
    }

    if response.headers().contains_key(header::SET_COOKIE) {
        return false;
    }

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if !is_json {
        return false;
    }

    // Unknown length means a stream; leave it alone.
    let size = axum::body::HttpBody::size_hint(response.body());
    size.upper()
        .is_some_and(|upper| upper <= max_body_bytes as u64)
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    *name == header::TRANSFER_ENCODING || *name == header::CONNECTION
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{
        Json, Router,
        extract::Request as AxumRequest,
        middleware::{self, Next as AxumNext},
        routing::get,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use http_body_util::Limited;

    use super::*;
    use crate::cache::backend::MemoryBackend;

    struct Harness {
        router: Router,
        calls: Arc<AtomicUsize>,
        backend: Arc<MemoryBackend>,
        store: Arc<CacheStore>,
    }

    async fn harness(config: CacheConfig) -> Harness {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(CacheStore::new(backend.clone(), &config));
        store.connect().await.expect("memory backend connects");
        let state = CacheState::new(store.clone(), &config);
        let calls = Arc::new(AtomicUsize::new(0));

        let json_calls = calls.clone();
        let text_calls = calls.clone();
        let cookie_calls = calls.clone();
        let missing_calls = calls.clone();

        let router = Router::new()
            .route(
                "/api/tasks",
                get(move || {
                    let calls = json_calls.clone();
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        Json(json!({ "status": true, "tasks": [], "call": n }))
                    }
                }),
            )
            .route(
                "/api/text",
                get(move || {
                    let calls = text_calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        "plain"
                    }
                }),
            )
            .route(
                "/api/cookie",
                get(move || {
                    let calls = cookie_calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        ([(header::SET_COOKIE, "token=abc")], Json(json!({ "status": true })))
                    }
                }),
            )
            .route(
                "/api/missing",
                get(move || {
                    let calls = missing_calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        (
                            StatusCode::NOT_FOUND,
                            Json(json!({ "status": false, "message": "nope" })),
                        )
                    }
                }),
            )
            .route(
                "/api/broken",
                get(|| async {
                    // Advertises a small body, then fails while it is read.
                    let body = Limited::new(Body::from(r#"{"status":true,"tasks":["a","b"]}"#), 16);
                    ([(header::CONTENT_TYPE, "application/json")], Body::new(body))
                }),
            )
            .layer(middleware::from_fn_with_state(state, response_cache_layer));

        Harness {
            router,
            calls,
            backend,
            store,
        }
    }

    async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router is infallible");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec();
        (status, body)
    }

    #[tokio::test]
    async fn second_get_is_served_from_cache() {
        let h = harness(CacheConfig::in_memory()).await;

        let (status, first) = send(&h.router, Method::GET, "/api/tasks?b=2&a=1").await;
        assert_eq!(status, StatusCode::OK);
        let (_, second) = send(&h.router, Method::GET, "/api/tasks?a=1&b=2").await;

        assert_eq!(first, second);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        let body: Value = serde_json::from_slice(&second).expect("json body");
        assert_eq!(body["call"], 0);
    }

    #[tokio::test]
    async fn cached_headers_are_replayed() {
        let h = harness(CacheConfig::in_memory()).await;
        send(&h.router, Method::GET, "/api/tasks").await;

        let response = h
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/tasks")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router is infallible");
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("content type"),
            "application/json"
        );
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_json_cookie_and_error_responses_are_not_cached() {
        let h = harness(CacheConfig::in_memory()).await;
        for uri in ["/api/text", "/api/cookie", "/api/missing"] {
            send(&h.router, Method::GET, uri).await;
            send(&h.router, Method::GET, uri).await;
        }
        assert_eq!(h.calls.load(Ordering::SeqCst), 6);
        assert!(h.backend.is_empty());
    }

    #[tokio::test]
    async fn body_failure_keeps_handler_status_and_skips_store() {
        let h = harness(CacheConfig::in_memory()).await;
        let response = h
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/broken")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router is infallible");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("content type"),
            "application/json"
        );
        assert!(response.into_body().collect().await.is_err());
        assert!(h.backend.is_empty());
    }

    #[tokio::test]
    async fn non_get_requests_bypass_the_cache() {
        let h = harness(CacheConfig::in_memory()).await;
        send(&h.router, Method::GET, "/api/tasks").await;
        let (status, _) = send(&h.router, Method::POST, "/api/tasks").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(h.backend.len(), 1);
    }

    #[tokio::test]
    async fn disabled_cache_always_runs_handler() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::in_memory()
        };
        let h = harness(config).await;
        send(&h.router, Method::GET, "/api/tasks").await;
        send(&h.router, Method::GET, "/api/tasks").await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
        assert!(h.backend.is_empty());
    }

    #[tokio::test]
    async fn oversized_bodies_pass_through() {
        let config = CacheConfig {
            max_body_bytes: 8,
            ..CacheConfig::in_memory()
        };
        let h = harness(config).await;
        let (status, _) = send(&h.router, Method::GET, "/api/tasks").await;
        assert_eq!(status, StatusCode::OK);
        assert!(h.backend.is_empty());
    }

    #[tokio::test]
    async fn closed_store_still_serves_fresh_responses() {
        let h = harness(CacheConfig::in_memory()).await;
        let _ = h.store.quit().await;

        let (status, body) = send(&h.router, Method::GET, "/api/tasks").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body["status"], true);

        send(&h.router, Method::GET, "/api/tasks").await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn corrupt_entry_is_treated_as_miss() {
        let h = harness(CacheConfig::in_memory()).await;
        let _ = h
            .store
            .set_raw("cache:/api/tasks", "{\"broken\":", Duration::from_secs(60))
            .await;

        let (status, _) = send(&h.router, Method::GET, "/api/tasks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);

        // The fresh response replaced the corrupt entry.
        send(&h.router, Method::GET, "/api/tasks").await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn scopes_get_separate_entries() {
        let h = harness(CacheConfig::in_memory()).await;
        let router = h.router.clone().layer(middleware::from_fn(
            |mut request: AxumRequest, next: AxumNext| async move {
                let scope = request
                    .headers()
                    .get("x-scope")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("anonymous")
                    .to_string();
                request.extensions_mut().insert(CacheScope::user(scope));
                next.run(request).await
            },
        ));

        for scope in ["u1", "u2", "u1"] {
            router
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/api/tasks")
                        .header("x-scope", scope)
                        .body(Body::empty())
                        .expect("request"),
                )
                .await
                .expect("router is infallible");
        }

        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.backend.len(), 2);
    }

    #[test]
    fn invalid_status_is_rejected_on_replay() {
        let cached = CachedResponse {
            status: 500,
            headers: Vec::new(),
            body: "{}".to_string(),
        };
        assert!(cached.into_response().is_none());
    }
}
