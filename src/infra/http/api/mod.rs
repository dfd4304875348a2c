pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};

use crate::cache::{CacheState, response_cache_layer};

/// Routes of the task API.
///
/// Reads are layered with the response cache; writes invalidate through the
/// services. Every `/api/tasks` and `/api/users` route requires a token,
/// except `POST /api/users/login` which issues one.
pub fn build_api_router(state: ApiState) -> Router {
    let auth_state = state.clone();

    let cached_reads = cached(
        Router::new()
            .route("/api/tasks", get(handlers::list_tasks))
            .route("/api/tasks/{id}", get(handlers::get_task))
            .route("/api/users/get-team", get(handlers::get_team)),
        state.cache.clone(),
    );

    let dashboard = cached(
        Router::new().route("/api/tasks/dashboard", get(handlers::dashboard_statistics)),
        state.dashboard_cache.clone(),
    );

    // Notifications are personal, so even administrators get their own entry.
    let notifications = cached(
        Router::new().route("/api/users/notifications", get(handlers::get_notifications)),
        state.cache.clone(),
    )
    .route_layer(axum_middleware::from_fn(middleware::per_user_cache_scope));

    let writes = Router::new()
        .route("/api/tasks/create", post(handlers::create_task))
        .route("/api/tasks/duplicate/{id}", post(handlers::duplicate_task))
        .route("/api/tasks/activity/{id}", post(handlers::post_task_activity))
        .route(
            "/api/tasks/create-subtask/{id}",
            put(handlers::create_sub_task),
        )
        .route("/api/tasks/update/{id}", put(handlers::update_task))
        .route("/api/tasks/{id}", put(handlers::trash_task))
        .route(
            "/api/tasks/delete-restore",
            delete(handlers::delete_restore_all),
        )
        .route(
            "/api/tasks/delete-restore/{id}",
            delete(handlers::delete_restore_task),
        )
        .route("/api/users/register", post(handlers::register_user))
        .route("/api/users/logout", post(handlers::logout_user))
        .route(
            "/api/users/change-password",
            put(handlers::change_user_password),
        )
        .route("/api/users/profile", put(handlers::update_profile))
        .route("/api/users/read-noti", put(handlers::mark_notifications_read))
        .route(
            "/api/users/{id}",
            put(handlers::activate_user).delete(handlers::delete_user),
        );

    let protected = cached_reads
        .merge(dashboard)
        .merge(notifications)
        .merge(writes)
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::protect_route,
        ));

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/users/login", post(handlers::login_user))
        .merge(protected)
        .with_state(state)
}

fn cached(routes: Router<ApiState>, cache: CacheState) -> Router<ApiState> {
    routes.route_layer(axum_middleware::from_fn_with_state(
        cache,
        response_cache_layer,
    ))
}
