//! API handlers organized by resource type.
//!
//! Helper functions for error conversion are defined here and shared across modules.

mod health;
mod tasks;
mod users;

pub use health::*;
pub use tasks::*;
pub use users::*;

use axum::http::StatusCode;

use crate::application::auth::AuthError;
use crate::application::repos::RepoError;
use crate::application::tasks::TaskServiceError;
use crate::application::users::UserServiceError;
use crate::domain::error::DomainError;

use super::error::ApiError;

// ----- Error conversion helpers -----

pub(super) fn domain_to_api(err: DomainError) -> ApiError {
    match err {
        DomainError::NotFound { entity } => ApiError::not_found(not_found_message(entity)),
        DomainError::Validation { message } => ApiError::bad_request(message),
        DomainError::Conflict { message } => ApiError::bad_request(message),
    }
}

pub(super) fn repo_to_api(source: &'static str, err: RepoError) -> ApiError {
    match err {
        RepoError::NotFound => ApiError::not_found("Resource not found"),
        RepoError::InvalidInput { ref message } => {
            let message = message.clone();
            ApiError::with_source(StatusCode::BAD_REQUEST, message, source, &err)
        }
        RepoError::Duplicate { .. } => {
            ApiError::with_source(StatusCode::BAD_REQUEST, "Duplicate record", source, &err)
        }
        RepoError::Timeout => ApiError::with_source(
            StatusCode::SERVICE_UNAVAILABLE,
            "Database timeout",
            source,
            &err,
        ),
        RepoError::Persistence(_) => ApiError::internal(source, &err),
    }
}

pub(super) fn task_to_api(err: TaskServiceError) -> ApiError {
    match err {
        TaskServiceError::Domain(err) => domain_to_api(err),
        TaskServiceError::Repo(err) => repo_to_api("infra::http::api::tasks", err),
    }
}

pub(super) fn user_to_api(err: UserServiceError) -> ApiError {
    match err {
        UserServiceError::Domain(DomainError::NotFound { .. }) => ApiError::user_not_found(),
        UserServiceError::Domain(err) => domain_to_api(err),
        UserServiceError::Repo(err) => repo_to_api("infra::http::api::users", err),
        UserServiceError::Auth(err) => auth_to_api(err),
    }
}

pub(super) fn auth_to_api(err: AuthError) -> ApiError {
    match err {
        AuthError::Forbidden => ApiError::forbidden(),
        AuthError::UserNotFound => ApiError::user_not_found(),
        AuthError::Repo(err) => repo_to_api("infra::http::api::auth", err),
        AuthError::Invalid => ApiError::unauthorized(),
        AuthError::Inactive => ApiError::new(
            StatusCode::UNAUTHORIZED,
            "User account has been deactivated, contact the administrator",
        ),
        AuthError::InvalidCredentials => {
            ApiError::new(StatusCode::UNAUTHORIZED, "Invalid email or password.")
        }
        err @ AuthError::WeakPassword => ApiError::bad_request(capitalize(&err.to_string())),
    }
}

fn not_found_message(entity: &str) -> String {
    if entity.is_empty() {
        return "Resource not found".to_string();
    }
    format!("{} not found", capitalize(entity))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}
