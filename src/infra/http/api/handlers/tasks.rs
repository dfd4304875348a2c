//! Task handlers

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::auth::Principal;
use crate::application::tasks::{
    CreateSubTaskCommand, CreateTaskCommand, PostActivityCommand, UpdateTaskCommand,
};
use crate::domain::types::TrashAction;

use super::{auth_to_api, task_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn create_task(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<TaskWriteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_admin().map_err(auth_to_api)?;

    let command = CreateTaskCommand {
        title: payload.title,
        date: parse_optional_date(payload.date.as_deref())?,
        priority: payload
            .priority
            .as_deref()
            .map(parse_priority)
            .transpose()?
            .unwrap_or_default(),
        stage: payload
            .stage
            .as_deref()
            .map(parse_stage)
            .transpose()?
            .unwrap_or_default(),
        team: payload.team,
        assets: payload.assets,
    };

    let task = state
        .tasks
        .create(&principal, command)
        .await
        .map_err(task_to_api)?;

    Ok((
        StatusCode::CREATED,
        Json(TaskWrittenResponse {
            status: true,
            task,
            message: "Task created successfully.".to_string(),
        }),
    ))
}

pub async fn duplicate_task(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_admin().map_err(auth_to_api)?;

    let task = state
        .tasks
        .duplicate(&principal, &id)
        .await
        .map_err(task_to_api)?;

    Ok(Json(TaskWrittenResponse {
        status: true,
        task,
        message: "Task duplicated successfully.".to_string(),
    }))
}

pub async fn post_task_activity(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(payload): Json<ActivityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = PostActivityCommand {
        task_id: id,
        activity_type: parse_activity_type(&payload.activity_type)?,
        activity: payload.activity,
    };

    state
        .tasks
        .post_activity(&principal, command)
        .await
        .map_err(task_to_api)?;

    Ok(Json(MessageResponse::ok("Activity posted successfully.")))
}

pub async fn dashboard_statistics(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .tasks
        .dashboard(&principal)
        .await
        .map_err(task_to_api)?;

    Ok(Json(DashboardResponse {
        status: true,
        stats,
    }))
}

pub async fn list_tasks(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<TaskListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let stage = query
        .stage
        .as_deref()
        .filter(|stage| !stage.trim().is_empty())
        .map(parse_stage)
        .transpose()?;
    let is_trashed = query
        .is_trashed
        .as_deref()
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"));

    let tasks = state
        .tasks
        .list(&principal, stage, is_trashed, query.search)
        .await
        .map_err(task_to_api)?;

    Ok(Json(TaskListResponse {
        status: true,
        tasks,
    }))
}

pub async fn get_task(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.tasks.get(&id).await.map_err(task_to_api)?;
    Ok(Json(TaskResponse { status: true, task }))
}

pub async fn create_sub_task(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(payload): Json<SubTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_admin().map_err(auth_to_api)?;

    let command = CreateSubTaskCommand {
        task_id: id,
        title: payload.title,
        tag: payload.tag,
        date: parse_optional_date(payload.date.as_deref())?,
    };

    let sub_task = state
        .tasks
        .create_sub_task(command)
        .await
        .map_err(task_to_api)?;

    Ok((
        StatusCode::CREATED,
        Json(SubTaskResponse {
            status: true,
            sub_task,
            message: "SubTask added successfully.".to_string(),
        }),
    ))
}

pub async fn update_task(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(payload): Json<TaskWriteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_admin().map_err(auth_to_api)?;

    let command = UpdateTaskCommand {
        id,
        title: payload.title,
        date: parse_optional_date(payload.date.as_deref())?,
        priority: payload
            .priority
            .as_deref()
            .map(parse_priority)
            .transpose()?
            .unwrap_or_default(),
        stage: payload
            .stage
            .as_deref()
            .map(parse_stage)
            .transpose()?
            .unwrap_or_default(),
        team: payload.team,
        assets: payload.assets,
    };

    let task = state.tasks.update(command).await.map_err(task_to_api)?;

    Ok(Json(TaskWrittenResponse {
        status: true,
        task,
        message: "Task updated successfully.".to_string(),
    }))
}

pub async fn trash_task(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_admin().map_err(auth_to_api)?;

    state.tasks.trash(&id).await.map_err(task_to_api)?;

    Ok(Json(MessageResponse::ok("Task trashed successfully.")))
}

pub async fn delete_restore_task(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Query(query): Query<DeleteRestoreQuery>,
) -> Result<impl IntoResponse, ApiError> {
    delete_restore(&state, &principal, &id, query.action_type).await
}

/// `deleteAll` and `restoreAll` may be sent without a task id.
pub async fn delete_restore_all(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<DeleteRestoreQuery>,
) -> Result<impl IntoResponse, ApiError> {
    delete_restore(&state, &principal, "", query.action_type).await
}

async fn delete_restore(
    state: &ApiState,
    principal: &Principal,
    id: &str,
    action: TrashAction,
) -> Result<Json<MessageResponse>, ApiError> {
    principal.require_admin().map_err(auth_to_api)?;

    let needs_id = matches!(action, TrashAction::Delete | TrashAction::Restore);
    if needs_id && id.is_empty() {
        return Err(ApiError::bad_request("Task id is required"));
    }

    state
        .tasks
        .delete_restore(id, action)
        .await
        .map_err(task_to_api)?;

    let message = match action {
        TrashAction::Delete | TrashAction::DeleteAll => "Task deleted successfully.",
        TrashAction::Restore | TrashAction::RestoreAll => "Task restored successfully.",
    };
    Ok(Json(MessageResponse::ok(message)))
}
