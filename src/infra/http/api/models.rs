//! Request and response bodies of the JSON API.

use serde::{Deserialize, Serialize};
use time::{
    Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};

use crate::application::tasks::{DashboardStats, TaskView};
use crate::domain::entities::{NoticeRecord, SubTaskRecord, TaskRecord, UserRecord};
use crate::domain::types::{ActivityType, TaskPriority, TaskStage, TrashAction};

use super::error::ApiError;

// ----- Requests -----

#[derive(Debug, Deserialize)]
pub struct TaskWriteRequest {
    pub title: String,
    #[serde(default)]
    pub team: Vec<String>,
    pub stage: Option<String>,
    pub priority: Option<String>,
    pub date: Option<String>,
    #[serde(default)]
    pub assets: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    #[serde(rename = "type")]
    pub activity_type: String,
    pub activity: String,
}

#[derive(Debug, Deserialize)]
pub struct SubTaskRequest {
    pub title: String,
    #[serde(default)]
    pub tag: String,
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskListQuery {
    pub stage: Option<String>,
    pub is_trashed: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRestoreQuery {
    pub action_type: TrashAction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileRequest {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReadNoticeQuery {
    pub is_read_type: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRequest {
    pub is_active: bool,
}

// ----- Responses -----

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskWrittenResponse {
    pub status: bool,
    pub task: TaskRecord,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub status: bool,
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub status: bool,
    pub task: TaskView,
}

#[derive(Debug, Serialize)]
pub struct SubTaskResponse {
    pub status: bool,
    #[serde(rename = "subTask")]
    pub sub_task: SubTaskRecord,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub status: bool,
    #[serde(flatten)]
    pub stats: DashboardStats,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: bool,
    pub user: UserRecord,
    /// Plaintext access token; only returned here.
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub status: bool,
    pub user: UserRecord,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub status: bool,
    pub team: Vec<UserRecord>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub status: bool,
    pub notifications: Vec<NoticeRecord>,
}

#[derive(Debug, Serialize)]
pub struct UserWrittenResponse {
    pub status: bool,
    pub message: String,
    pub user: UserRecord,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: bool,
    pub cache: crate::cache::CacheHealth,
}

// ----- Parsing helpers -----

/// Stages and priorities arrive in any letter case.
pub fn parse_stage(value: &str) -> Result<TaskStage, ApiError> {
    let value = value.trim().to_lowercase();
    TaskStage::ALL
        .into_iter()
        .find(|stage| stage.as_str() == value)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown task stage `{value}`")))
}

pub fn parse_priority(value: &str) -> Result<TaskPriority, ApiError> {
    let value = value.trim().to_lowercase();
    TaskPriority::ALL
        .into_iter()
        .find(|priority| priority.as_str() == value)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown task priority `{value}`")))
}

pub fn parse_activity_type(value: &str) -> Result<ActivityType, ApiError> {
    let value = value.trim().to_lowercase();
    serde_json::from_value(serde_json::Value::String(value.clone()))
        .map_err(|_| ApiError::bad_request(format!("Unknown activity type `{value}`")))
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(value: &str) -> Result<OffsetDateTime, ApiError> {
    let value = value.trim();
    if let Ok(timestamp) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(timestamp);
    }
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| ApiError::bad_request(format!("Invalid date `{value}`")))
}

pub fn parse_optional_date(value: Option<&str>) -> Result<Option<OffsetDateTime>, ApiError> {
    value
        .filter(|value| !value.trim().is_empty())
        .map(parse_date)
        .transpose()
}
