//! User, team and notification handlers

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::application::auth::Principal;
use crate::application::users::{ReadTarget, RegisterUserCommand, UpdateProfileCommand};

use super::{auth_to_api, user_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::middleware::{TOKEN_COOKIE, extract_token};
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

const TOKEN_COOKIE_DAYS: i64 = 30;

pub async fn register_user(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_admin().map_err(auth_to_api)?;

    let registered = state
        .users
        .register(RegisterUserCommand {
            name: payload.name,
            title: payload.title,
            role: payload.role,
            email: payload.email,
            is_admin: payload.is_admin,
            password: payload.password,
        })
        .await
        .map_err(user_to_api)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            status: true,
            user: registered.user,
            token: registered.token,
        }),
    ))
}

pub async fn login_user(
    State(state): State<ApiState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .auth
        .login(&payload.email, &payload.password)
        .await
        .map_err(auth_to_api)?;

    let cookie = Cookie::build((TOKEN_COOKIE, outcome.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::days(TOKEN_COOKIE_DAYS));

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            status: true,
            user: outcome.user,
            token: outcome.token,
        }),
    ))
}

pub async fn logout_user(
    State(state): State<ApiState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = extract_token(&headers) {
        state.auth.logout(&token).await.map_err(auth_to_api)?;
    }

    // Always expire the cookie, even for header-authenticated callers.
    let expired = Cookie::build((TOKEN_COOKIE, ""))
        .path("/")
        .http_only(true)
        .removal();
    Ok((jar.add(expired), Json(MessageResponse::ok("Logged out"))))
}

pub async fn change_user_password(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .users
        .change_password(&principal, &payload.password)
        .await
        .map_err(user_to_api)?;

    Ok(Json(MessageResponse::ok("Password changed")))
}

pub async fn get_team(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_admin().map_err(auth_to_api)?;

    let team = state.users.team().await.map_err(user_to_api)?;
    Ok(Json(TeamResponse { status: true, team }))
}

pub async fn get_notifications(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let notifications = state
        .users
        .notifications(&principal)
        .await
        .map_err(user_to_api)?;

    Ok(Json(NotificationsResponse {
        status: true,
        notifications,
    }))
}

pub async fn update_profile(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<ProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .users
        .update_profile(
            &principal,
            UpdateProfileCommand {
                target: payload.id,
                name: payload.name,
                title: payload.title,
                role: payload.role,
            },
        )
        .await
        .map_err(user_to_api)?;

    Ok(Json(UserWrittenResponse {
        status: true,
        message: "Profile updated successfully.".to_string(),
        user,
    }))
}

pub async fn mark_notifications_read(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ReadNoticeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let target = match (query.is_read_type.as_deref(), query.id) {
        (Some("all"), _) => ReadTarget::All,
        (_, Some(id)) if !id.trim().is_empty() => ReadTarget::One(id),
        _ => return Err(ApiError::bad_request("Provide isReadType=all or a notice id")),
    };

    state
        .users
        .mark_notifications_read(&principal, target)
        .await
        .map_err(user_to_api)?;

    Ok(Json(MessageResponse::ok("Notifications marked as read")))
}

pub async fn activate_user(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(payload): Json<ActivationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_admin().map_err(auth_to_api)?;

    let user = state
        .users
        .set_active(&id, payload.is_active)
        .await
        .map_err(user_to_api)?;

    let verb = if user.is_active { "activated" } else { "disabled" };
    Ok(Json(UserWrittenResponse {
        status: true,
        message: format!("User account has been {verb}"),
        user,
    }))
}

pub async fn delete_user(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_admin().map_err(auth_to_api)?;

    state.users.delete(&id).await.map_err(user_to_api)?;

    Ok(Json(MessageResponse::ok("User deleted successfully")))
}
