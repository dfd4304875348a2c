//! The API keeps answering when the cache is unreachable.

mod support;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;

use planity::cache::{CacheBackend, ConnectionState, MemoryBackend};
use support::{TestApp, read_json, task_titles};

#[tokio::test]
async fn reads_and_writes_work_without_a_connection() {
    let backend = Arc::new(MemoryBackend::new());
    let app = TestApp::with_backend(backend.clone(), false).await;
    app.seed_task("123", "Uncached task");

    let (status, body) = app.get_json("/api/tasks", &app.admin_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task_titles(&body), vec!["Uncached task"]);

    let response = app
        .send(
            Method::PUT,
            "/api/tasks/update/123",
            Some(&app.admin_token),
            Some(json!({ "title": "Still writable" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (_, body) = app.get_json("/api/tasks", &app.admin_token).await;
    assert_eq!(task_titles(&body), vec!["Still writable"]);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn closed_cache_degrades_to_pass_through() {
    let app = TestApp::new().await;
    app.seed_task("123", "First");
    let _ = app.get_json("/api/tasks", &app.admin_token).await;

    let _ = app.store.quit().await;
    assert_eq!(app.store.state(), ConnectionState::Disconnected);

    app.seed_task("456", "Second");
    let (status, body) = app.get_json("/api/tasks", &app.admin_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task_titles(&body).len(), 2);
}

#[tokio::test]
async fn health_reports_unreachable_cache_without_failing() {
    let backend = Arc::new(MemoryBackend::new());
    let app = TestApp::with_backend(backend, false).await;

    let response = app.send(Method::GET, "/api/health", None, None).await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], true);
    assert_eq!(body["cache"]["reachable"], false);
}

#[tokio::test]
async fn reconnecting_resumes_caching() {
    let backend = Arc::new(MemoryBackend::new());
    let app = TestApp::with_backend(backend.clone(), false).await;
    app.seed_task("123", "Task");

    let _ = app.get_json("/api/tasks", &app.admin_token).await;
    assert!(backend.is_empty());

    backend.connect().await.expect("memory backend connects");
    app.store.connect().await.expect("store connects");
    let _ = app.get_json("/api/tasks", &app.admin_token).await;
    assert_eq!(backend.len(), 1);
}
