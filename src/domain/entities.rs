//! Domain entities as held by the document store.
//!
//! Identifiers are opaque strings and serialize as `_id`, matching the
//! document-store convention clients already rely on.

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::types::{ActivityType, NoticeType, TaskPriority, TaskStage};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub title: String,
    pub role: String,
    pub email: String,
    pub is_admin: bool,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Hashed bearer credential belonging to a user.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessTokenRecord {
    pub prefix: String,
    pub hashed_secret: Vec<u8>,
    pub user_id: String,
    pub created_at: OffsetDateTime,
}

/// Salted password hash; never serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct PasswordRecord {
    pub user_id: String,
    pub salt: Vec<u8>,
    pub hashed_password: Vec<u8>,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub activity: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTaskRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub priority: TaskPriority,
    pub stage: TaskStage,
    pub activities: Vec<ActivityRecord>,
    pub sub_tasks: Vec<SubTaskRecord>,
    pub assets: Vec<String>,
    /// Member user ids.
    pub team: Vec<String>,
    pub is_trashed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TaskRecord {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.team.iter().any(|member| member == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub team: Vec<String>,
    pub text: String,
    pub task: Option<String>,
    pub noti_type: NoticeType,
    /// Users who have marked the notice read.
    pub is_read: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl NoticeRecord {
    pub fn is_unread_by(&self, user_id: &str) -> bool {
        self.team.iter().any(|member| member == user_id)
            && !self.is_read.iter().any(|reader| reader == user_id)
    }
}
