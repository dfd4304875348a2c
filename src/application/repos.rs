//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{
    AccessTokenRecord, ActivityRecord, NoticeRecord, PasswordRecord, SubTaskRecord, TaskRecord,
    UserRecord,
};
use crate::domain::types::{NoticeType, TaskPriority, TaskStage};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Field filters for task listings. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct TaskQueryFilter {
    pub stage: Option<TaskStage>,
    pub is_trashed: bool,
    /// Case-insensitive match on title, stage or priority.
    pub search: Option<String>,
    /// Restrict to tasks where this user is a team member.
    pub member: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub name: String,
    pub title: String,
    pub role: String,
    pub email: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateProfileParams {
    pub id: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateTaskParams {
    pub title: String,
    pub date: OffsetDateTime,
    pub priority: TaskPriority,
    pub stage: TaskStage,
    pub team: Vec<String>,
    pub assets: Vec<String>,
    pub activities: Vec<ActivityRecord>,
    pub sub_tasks: Vec<SubTaskRecord>,
}

#[derive(Debug, Clone)]
pub struct UpdateTaskParams {
    pub id: String,
    pub title: String,
    pub date: OffsetDateTime,
    pub priority: TaskPriority,
    pub stage: TaskStage,
    pub team: Vec<String>,
    pub assets: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CreateNoticeParams {
    pub team: Vec<String>,
    pub text: String,
    pub task: Option<String>,
    pub noti_type: NoticeType,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn find_user(&self, id: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_users(&self, ids: &[String]) -> Result<Vec<UserRecord>, RepoError>;

    async fn list_users(&self) -> Result<Vec<UserRecord>, RepoError>;

    async fn update_profile(&self, params: UpdateProfileParams) -> Result<UserRecord, RepoError>;

    async fn set_active(&self, id: &str, is_active: bool) -> Result<UserRecord, RepoError>;

    async fn delete_user(&self, id: &str) -> Result<(), RepoError>;
}

/// Access tokens and password hashes.
#[async_trait]
pub trait CredentialsRepo: Send + Sync {
    async fn store_token(&self, record: AccessTokenRecord) -> Result<(), RepoError>;

    async fn find_token(&self, prefix: &str) -> Result<Option<AccessTokenRecord>, RepoError>;

    /// Returns whether a token was removed.
    async fn revoke_token(&self, prefix: &str) -> Result<bool, RepoError>;

    /// Returns the number of tokens removed.
    async fn revoke_user_tokens(&self, user_id: &str) -> Result<u64, RepoError>;

    /// Insert or replace the password of `record.user_id`.
    async fn store_password(&self, record: PasswordRecord) -> Result<(), RepoError>;

    async fn find_password(&self, user_id: &str) -> Result<Option<PasswordRecord>, RepoError>;
}

#[async_trait]
pub trait TasksRepo: Send + Sync {
    async fn create_task(&self, params: CreateTaskParams) -> Result<TaskRecord, RepoError>;

    async fn find_task(&self, id: &str) -> Result<Option<TaskRecord>, RepoError>;

    /// Newest first.
    async fn list_tasks(&self, filter: &TaskQueryFilter) -> Result<Vec<TaskRecord>, RepoError>;

    async fn update_task(&self, params: UpdateTaskParams) -> Result<TaskRecord, RepoError>;

    async fn push_activity(
        &self,
        id: &str,
        activity: ActivityRecord,
    ) -> Result<TaskRecord, RepoError>;

    async fn push_sub_task(&self, id: &str, sub_task: SubTaskRecord)
    -> Result<TaskRecord, RepoError>;

    async fn set_trashed(&self, id: &str, is_trashed: bool) -> Result<TaskRecord, RepoError>;

    /// Restore every trashed task; returns the number restored.
    async fn restore_all(&self) -> Result<u64, RepoError>;

    async fn delete_task(&self, id: &str) -> Result<(), RepoError>;

    /// Permanently delete every trashed task; returns the number removed.
    async fn delete_trashed(&self) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait NoticesRepo: Send + Sync {
    async fn create_notice(&self, params: CreateNoticeParams) -> Result<NoticeRecord, RepoError>;

    /// Notices addressed to `user_id` that they have not read, newest first.
    async fn list_unread(&self, user_id: &str) -> Result<Vec<NoticeRecord>, RepoError>;

    /// Returns false when the notice does not exist or is already read.
    async fn mark_read(&self, user_id: &str, notice_id: &str) -> Result<bool, RepoError>;

    async fn mark_all_read(&self, user_id: &str) -> Result<u64, RepoError>;
}
