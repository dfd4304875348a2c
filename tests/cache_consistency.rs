//! Read-through caching and write invalidation across the full router.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;

use planity::cache::{CacheBackend, CacheError, CacheResult, MemoryBackend};
use support::{TestApp, read_json, task_titles};

const ADMIN_TASKS_KEY: &str = "cache:/api/tasks?__scope=admin";

#[tokio::test]
async fn repeated_read_is_served_from_cache() {
    let app = TestApp::new().await;
    app.seed_task("123", "Write release notes");

    let (status, first) = app.get_json("/api/tasks", &app.admin_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task_titles(&first), vec!["Write release notes"]);
    assert!(app.store.get_raw(ADMIN_TASKS_KEY).await.is_some());

    // Changed behind the service's back: a cache hit must not see it.
    app.seed_task("456", "Unannounced task");
    let (status, second) = app.get_json("/api/tasks", &app.admin_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, first);
}

#[tokio::test]
async fn update_invalidates_task_reads() {
    let app = TestApp::new().await;
    app.seed_task("123", "Original title");

    let (_, before) = app.get_json("/api/tasks", &app.admin_token).await;
    assert_eq!(task_titles(&before), vec!["Original title"]);
    let (_, single) = app.get_json("/api/tasks/123", &app.admin_token).await;
    assert_eq!(single["task"]["title"], "Original title");

    let response = app
        .send(
            Method::PUT,
            "/api/tasks/update/123",
            Some(&app.admin_token),
            Some(json!({
                "title": "Renamed title",
                "stage": "in progress",
                "priority": "high",
                "team": [app.member_id],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(app.store.get_raw(ADMIN_TASKS_KEY).await.is_none());
    assert!(app.store.get_raw("cache:/api/tasks/123?__scope=admin").await.is_none());

    let (_, after) = app.get_json("/api/tasks", &app.admin_token).await;
    assert_eq!(task_titles(&after), vec!["Renamed title"]);
    let (_, single) = app.get_json("/api/tasks/123", &app.admin_token).await;
    assert_eq!(single["task"]["title"], "Renamed title");
}

#[tokio::test]
async fn scopes_keep_admin_and_member_views_apart() {
    let app = TestApp::new().await;
    app.seed_task("123", "Shared task");

    let (_, admin_view) = app.get_json("/api/tasks", &app.admin_token).await;
    let (_, member_view) = app.get_json("/api/tasks", &app.member_token).await;
    assert_eq!(task_titles(&admin_view), task_titles(&member_view));

    let member_key = format!("cache:/api/tasks?__scope={}", app.member_id);
    assert!(app.store.get_raw(ADMIN_TASKS_KEY).await.is_some());
    assert!(app.store.get_raw(&member_key).await.is_some());

    // A forged scope parameter is replaced by the caller's own.
    let (_, forged) = app
        .get_json("/api/tasks?__scope=admin", &app.member_token)
        .await;
    assert_eq!(forged, member_view);
}

#[tokio::test]
async fn failed_write_leaves_cache_untouched() {
    let app = TestApp::new().await;
    app.seed_task("123", "Kept task");
    let _ = app.get_json("/api/tasks", &app.admin_token).await;

    let response = app
        .send(
            Method::PUT,
            "/api/tasks/update/missing",
            Some(&app.admin_token),
            Some(json!({ "title": "Nope" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.store.get_raw(ADMIN_TASKS_KEY).await.is_some());
}

#[tokio::test]
async fn error_responses_are_not_cached() {
    let app = TestApp::new().await;

    let (status, _) = app.get_json("/api/tasks/missing", &app.admin_token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(
        app.store
            .get_raw("cache:/api/tasks/missing?__scope=admin")
            .await
            .is_none()
    );

    let (status, _) = app.get_json("/api/users/get-team", &app.member_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let member_key = format!("cache:/api/users/get-team?__scope={}", app.member_id);
    assert!(app.store.get_raw(&member_key).await.is_none());
}

#[tokio::test]
async fn notifications_are_cached_per_user_and_dropped_on_read() {
    let app = TestApp::new().await;

    let response = app
        .send(
            Method::POST,
            "/api/tasks/create",
            Some(&app.admin_token),
            Some(json!({ "title": "Assigned work", "team": [app.member_id] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let (status, body) = app
        .get_json("/api/users/notifications", &app.member_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notifications"].as_array().map(Vec::len), Some(1));

    let key = format!(
        "cache:/api/users/notifications?__scope={}",
        app.member_id
    );
    assert!(app.store.get_raw(&key).await.is_some());

    let response = app
        .send(
            Method::PUT,
            "/api/users/read-noti?isReadType=all",
            Some(&app.member_token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.store.get_raw(&key).await.is_none());

    let (_, body) = app
        .get_json("/api/users/notifications", &app.member_token)
        .await;
    assert_eq!(body["notifications"].as_array().map(Vec::len), Some(0));
}

/// Memory backend whose prefix deletes can be made to fail.
#[derive(Default)]
struct FlakyInvalidation {
    inner: MemoryBackend,
    fail_deletes: AtomicBool,
}

#[async_trait]
impl CacheBackend for FlakyInvalidation {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn connect(&self) -> CacheResult<()> {
        self.inner.connect().await
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.inner.set_ex(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        self.inner.delete(key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CacheError::backend("scan refused"));
        }
        self.inner.delete_prefix(prefix).await
    }

    async fn flush_all(&self) -> CacheResult<()> {
        self.inner.flush_all().await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.inner.ping().await
    }

    async fn quit(&self) -> CacheResult<()> {
        self.inner.quit().await
    }
}

#[tokio::test]
async fn write_succeeds_when_invalidation_fails() {
    let backend = Arc::new(FlakyInvalidation::default());
    let app = TestApp::with_backend(backend.clone(), true).await;
    app.seed_task("123", "Before");
    let _ = app.get_json("/api/tasks", &app.admin_token).await;

    backend.fail_deletes.store(true, Ordering::SeqCst);
    let response = app
        .send(
            Method::PUT,
            "/api/tasks/update/123",
            Some(&app.admin_token),
            Some(json!({ "title": "After" })),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task"]["title"], "After");

    // The stale entry survives until its TTL; the write itself stands.
    assert!(app.store.get_raw(ADMIN_TASKS_KEY).await.is_some());
    backend.fail_deletes.store(false, Ordering::SeqCst);

    let response = app
        .send(
            Method::PUT,
            "/api/tasks/update/123",
            Some(&app.admin_token),
            Some(json!({ "title": "After again" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let (_, list) = app.get_json("/api/tasks", &app.admin_token).await;
    assert_eq!(task_titles(&list), vec!["After again"]);
}
