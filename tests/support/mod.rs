//! Shared wiring for the router-level tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use time::OffsetDateTime;
use tower::ServiceExt;

use planity::application::auth::{AuthService, BootstrapAdmin};
use planity::application::repos::{CreateUserParams, UsersRepo};
use planity::application::tasks::TaskService;
use planity::application::users::UserService;
use planity::cache::{
    CacheBackend, CacheConfig, CacheInvalidator, CacheState, CacheStore, MemoryBackend,
};
use planity::domain::entities::TaskRecord;
use planity::domain::types::{TaskPriority, TaskStage};
use planity::infra::db::MemoryRepositories;
use planity::infra::http::{self, ApiState};

pub struct TestApp {
    pub router: Router,
    pub repos: Arc<MemoryRepositories>,
    pub store: Arc<CacheStore>,
    pub admin_id: String,
    pub admin_token: String,
    pub member_id: String,
    pub member_token: String,
}

impl TestApp {
    /// Application over a connected in-memory cache.
    pub async fn new() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()), true).await
    }

    /// Application over `backend`, connected only when `connect` is set.
    pub async fn with_backend(backend: Arc<dyn CacheBackend>, connect: bool) -> Self {
        let config = CacheConfig::in_memory();
        let store = Arc::new(CacheStore::new(backend, &config));
        if connect {
            store.connect().await.expect("test cache should connect");
        }

        let repos = Arc::new(MemoryRepositories::new());
        let auth = Arc::new(AuthService::new(repos.clone(), repos.clone()));
        let bootstrap = auth
            .bootstrap_admin(&BootstrapAdmin {
                name: "Admin".to_string(),
                email: "admin@planity.test".to_string(),
                token: None,
            })
            .await
            .expect("admin should bootstrap");
        let admin_token = bootstrap
            .generated_token
            .expect("a token is generated when none is configured");

        let member = repos
            .create_user(CreateUserParams {
                name: "Member".to_string(),
                title: "Engineer".to_string(),
                role: "Developer".to_string(),
                email: "member@planity.test".to_string(),
                is_admin: false,
            })
            .await
            .expect("member should be created");
        let member_token = auth
            .issue_token(&member.id)
            .await
            .expect("member token should be issued");

        let invalidator = Arc::new(CacheInvalidator::new(store.clone(), &config));
        let tasks = TaskService::new(repos.clone(), repos.clone(), repos.clone())
            .with_cache_invalidator(invalidator.clone());
        let users = UserService::new(repos.clone(), repos.clone(), auth.clone())
            .with_cache_invalidator(invalidator);

        let cache = CacheState::new(store.clone(), &config);
        let dashboard_cache = cache.with_ttl(config.dashboard_ttl);
        let router = http::build_router(ApiState {
            auth,
            tasks: Arc::new(tasks),
            users: Arc::new(users),
            cache,
            dashboard_cache,
        });

        Self {
            router,
            repos,
            store,
            admin_id: bootstrap.user.id,
            admin_token,
            member_id: member.id,
            member_token,
        }
    }

    /// Insert a task directly into the repository, bypassing invalidation.
    pub fn seed_task(&self, id: &str, title: &str) {
        let now = OffsetDateTime::now_utc();
        self.repos.seed_task(TaskRecord {
            id: id.to_string(),
            title: title.to_string(),
            date: now,
            priority: TaskPriority::Normal,
            stage: TaskStage::Todo,
            activities: Vec::new(),
            sub_tasks: Vec::new(),
            assets: Vec::new(),
            team: vec![self.member_id.clone()],
            is_trashed: false,
            created_at: now,
            updated_at: now,
        });
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request should build");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    pub async fn get_json(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        let response = self.send(Method::GET, uri, Some(token), None).await;
        read_json(response).await
    }
}

pub async fn read_json(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should buffer")
        .to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Titles of the tasks in a list response.
pub fn task_titles(body: &Value) -> Vec<String> {
    body["tasks"]
        .as_array()
        .map(|tasks| {
            tasks
                .iter()
                .filter_map(|task| task["title"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
