//! Task use cases.
//!
//! Every mutation invalidates the cached task views as soon as the write has
//! been accepted by the store, before any follow-up step that could fail.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::auth::Principal;
use crate::application::repos::{
    CreateNoticeParams, CreateTaskParams, NoticesRepo, RepoError, TaskQueryFilter, TasksRepo,
    UpdateTaskParams, UsersRepo,
};
use crate::cache::CacheInvalidator;
use crate::domain::entities::{ActivityRecord, SubTaskRecord, TaskRecord, UserRecord};
use crate::domain::error::DomainError;
use crate::domain::types::{
    ActivityType, NoticeType, TaskPriority, TaskStage, TrashAction,
};

const NOTICE_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[weekday repr:short] [month repr:short] [day] [year]");
const DASHBOARD_RECENT: usize = 10;
const DASHBOARD_USERS: usize = 10;

#[derive(Debug, Error)]
pub enum TaskServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

fn task_not_found(err: RepoError) -> TaskServiceError {
    match err {
        RepoError::NotFound => DomainError::not_found("task").into(),
        other => other.into(),
    }
}

#[derive(Debug, Clone)]
pub struct CreateTaskCommand {
    pub title: String,
    pub date: Option<OffsetDateTime>,
    pub priority: TaskPriority,
    pub stage: TaskStage,
    pub team: Vec<String>,
    pub assets: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateTaskCommand {
    pub id: String,
    pub title: String,
    pub date: Option<OffsetDateTime>,
    pub priority: TaskPriority,
    pub stage: TaskStage,
    pub team: Vec<String>,
    pub assets: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PostActivityCommand {
    pub task_id: String,
    pub activity_type: ActivityType,
    pub activity: String,
}

#[derive(Debug, Clone)]
pub struct CreateSubTaskCommand {
    pub task_id: String,
    pub title: String,
    pub tag: String,
    pub date: Option<OffsetDateTime>,
}

/// Team member as embedded in task payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamMember {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub title: String,
    pub role: String,
    pub email: String,
}

impl From<&UserRecord> for TeamMember {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            title: user.title.clone(),
            role: user.role.clone(),
            email: user.email.clone(),
        }
    }
}

/// Task with its team resolved to member summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    #[serde(flatten)]
    pub task: TaskRecord,
    pub team_members: Vec<TeamMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub title: String,
    pub role: String,
    pub is_admin: bool,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphPoint {
    pub name: &'static str,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_tasks: usize,
    #[serde(rename = "last10Task")]
    pub last_10_task: Vec<TaskView>,
    /// Populated for administrators only.
    pub users: Vec<DashboardUser>,
    /// Task count per stage.
    pub tasks: BTreeMap<&'static str, usize>,
    /// Task count per priority.
    pub graph_data: Vec<GraphPoint>,
}

pub struct TaskService {
    tasks: Arc<dyn TasksRepo>,
    users: Arc<dyn UsersRepo>,
    notices: Arc<dyn NoticesRepo>,
    cache_invalidator: Option<Arc<CacheInvalidator>>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TasksRepo>,
        users: Arc<dyn UsersRepo>,
        notices: Arc<dyn NoticesRepo>,
    ) -> Self {
        Self {
            tasks,
            users,
            notices,
            cache_invalidator: None,
        }
    }

    pub fn with_cache_invalidator(mut self, invalidator: Arc<CacheInvalidator>) -> Self {
        self.cache_invalidator = Some(invalidator);
        self
    }

    pub async fn create(
        &self,
        actor: &Principal,
        command: CreateTaskCommand,
    ) -> Result<TaskRecord, TaskServiceError> {
        let title = require_title(&command.title)?;
        let date = command.date.unwrap_or_else(OffsetDateTime::now_utc);
        let text = assignment_text(&command.team, command.priority, date);

        let task = self
            .tasks
            .create_task(CreateTaskParams {
                title,
                date,
                priority: command.priority,
                stage: command.stage,
                team: command.team.clone(),
                assets: command.assets,
                activities: vec![ActivityRecord {
                    id: new_id(),
                    activity_type: ActivityType::Assigned,
                    activity: text.clone(),
                    date: OffsetDateTime::now_utc(),
                    by: actor.user_id.clone(),
                }],
                sub_tasks: Vec::new(),
            })
            .await?;
        self.tasks_changed().await;

        info!(target = "planity::tasks", task_id = %task.id, "Task created");
        self.notify_team(&task, text).await?;
        Ok(task)
    }

    pub async fn duplicate(
        &self,
        actor: &Principal,
        task_id: &str,
    ) -> Result<TaskRecord, TaskServiceError> {
        let source = self.find(task_id).await?;
        let text = assignment_text(&source.team, source.priority, source.date);

        let mut activities = source.activities.clone();
        activities.push(ActivityRecord {
            id: new_id(),
            activity_type: ActivityType::Assigned,
            activity: text.clone(),
            date: OffsetDateTime::now_utc(),
            by: actor.user_id.clone(),
        });

        let task = self
            .tasks
            .create_task(CreateTaskParams {
                title: format!("{} - Duplicate", source.title),
                date: source.date,
                priority: source.priority,
                stage: source.stage,
                team: source.team.clone(),
                assets: source.assets.clone(),
                activities,
                sub_tasks: source
                    .sub_tasks
                    .iter()
                    .map(|sub_task| SubTaskRecord {
                        id: new_id(),
                        ..sub_task.clone()
                    })
                    .collect(),
            })
            .await?;
        self.tasks_changed().await;

        self.notify_team(&task, text).await?;
        Ok(task)
    }

    pub async fn post_activity(
        &self,
        actor: &Principal,
        command: PostActivityCommand,
    ) -> Result<TaskRecord, TaskServiceError> {
        let activity = command.activity.trim();
        if activity.is_empty() {
            return Err(DomainError::validation("activity text is required").into());
        }

        let task = self
            .tasks
            .push_activity(
                &command.task_id,
                ActivityRecord {
                    id: new_id(),
                    activity_type: command.activity_type,
                    activity: activity.to_string(),
                    date: OffsetDateTime::now_utc(),
                    by: actor.user_id.clone(),
                },
            )
            .await
            .map_err(task_not_found)?;
        self.tasks_changed().await;
        Ok(task)
    }

    pub async fn dashboard(&self, actor: &Principal) -> Result<DashboardStats, TaskServiceError> {
        let tasks = self.tasks.list_tasks(&visible_to(actor, false)).await?;

        let mut by_stage: BTreeMap<&'static str, usize> =
            TaskStage::ALL.iter().map(|stage| (stage.as_str(), 0)).collect();
        let mut by_priority: BTreeMap<TaskPriority, usize> = BTreeMap::new();
        for task in &tasks {
            *by_stage.entry(task.stage.as_str()).or_default() += 1;
            *by_priority.entry(task.priority).or_default() += 1;
        }

        let graph_data = TaskPriority::ALL
            .iter()
            .map(|priority| GraphPoint {
                name: priority.as_str(),
                total: by_priority.get(priority).copied().unwrap_or(0),
            })
            .collect();

        let users = if actor.is_admin {
            let mut users: Vec<_> = self
                .users
                .list_users()
                .await?
                .into_iter()
                .filter(|user| user.is_active)
                .collect();
            users.sort_by(|left, right| right.created_at.cmp(&left.created_at));
            users
                .into_iter()
                .take(DASHBOARD_USERS)
                .map(|user| DashboardUser {
                    id: user.id,
                    name: user.name,
                    title: user.title,
                    role: user.role,
                    is_admin: user.is_admin,
                    is_active: user.is_active,
                    created_at: user.created_at,
                })
                .collect()
        } else {
            Vec::new()
        };

        let total_tasks = tasks.len();
        let recent = tasks.into_iter().take(DASHBOARD_RECENT).collect();

        Ok(DashboardStats {
            total_tasks,
            last_10_task: self.with_members(recent).await?,
            users,
            tasks: by_stage,
            graph_data,
        })
    }

    pub async fn list(
        &self,
        actor: &Principal,
        stage: Option<TaskStage>,
        is_trashed: bool,
        search: Option<String>,
    ) -> Result<Vec<TaskView>, TaskServiceError> {
        let filter = TaskQueryFilter {
            stage,
            search: search.filter(|term| !term.trim().is_empty()),
            ..visible_to(actor, is_trashed)
        };
        let tasks = self.tasks.list_tasks(&filter).await?;
        self.with_members(tasks).await
    }

    pub async fn get(&self, task_id: &str) -> Result<TaskView, TaskServiceError> {
        let task = self.find(task_id).await?;
        let mut views = self.with_members(vec![task]).await?;
        views
            .pop()
            .ok_or_else(|| DomainError::not_found("task").into())
    }

    pub async fn create_sub_task(
        &self,
        command: CreateSubTaskCommand,
    ) -> Result<SubTaskRecord, TaskServiceError> {
        let title = require_title(&command.title)?;
        let sub_task = SubTaskRecord {
            id: new_id(),
            title,
            date: command.date.unwrap_or_else(OffsetDateTime::now_utc),
            tag: command.tag.trim().to_string(),
        };

        self.tasks
            .push_sub_task(&command.task_id, sub_task.clone())
            .await
            .map_err(task_not_found)?;
        self.tasks_changed().await;
        Ok(sub_task)
    }

    pub async fn update(&self, command: UpdateTaskCommand) -> Result<TaskRecord, TaskServiceError> {
        let title = require_title(&command.title)?;
        let current = self.find(&command.id).await?;

        let task = self
            .tasks
            .update_task(UpdateTaskParams {
                id: command.id,
                title,
                date: command.date.unwrap_or(current.date),
                priority: command.priority,
                stage: command.stage,
                team: command.team,
                assets: command.assets,
            })
            .await
            .map_err(task_not_found)?;
        self.tasks_changed().await;
        Ok(task)
    }

    pub async fn trash(&self, task_id: &str) -> Result<TaskRecord, TaskServiceError> {
        let task = self
            .tasks
            .set_trashed(task_id, true)
            .await
            .map_err(task_not_found)?;
        self.tasks_changed().await;
        Ok(task)
    }

    /// Apply `action`; returns the number of tasks affected.
    pub async fn delete_restore(
        &self,
        task_id: &str,
        action: TrashAction,
    ) -> Result<u64, TaskServiceError> {
        let affected = match action {
            TrashAction::Delete => {
                self.tasks.delete_task(task_id).await.map_err(task_not_found)?;
                1
            }
            TrashAction::DeleteAll => self.tasks.delete_trashed().await?,
            TrashAction::Restore => {
                self.tasks
                    .set_trashed(task_id, false)
                    .await
                    .map_err(task_not_found)?;
                1
            }
            TrashAction::RestoreAll => self.tasks.restore_all().await?,
        };
        self.tasks_changed().await;
        Ok(affected)
    }

    async fn find(&self, task_id: &str) -> Result<TaskRecord, TaskServiceError> {
        self.tasks
            .find_task(task_id)
            .await?
            .ok_or_else(|| DomainError::not_found("task").into())
    }

    async fn with_members(&self, tasks: Vec<TaskRecord>) -> Result<Vec<TaskView>, TaskServiceError> {
        let mut ids: Vec<String> = tasks.iter().flat_map(|task| task.team.clone()).collect();
        ids.sort();
        ids.dedup();
        let users = self.users.find_users(&ids).await?;

        Ok(tasks
            .into_iter()
            .map(|task| {
                let team_members = task
                    .team
                    .iter()
                    .filter_map(|id| users.iter().find(|user| &user.id == id))
                    .map(TeamMember::from)
                    .collect();
                TaskView { task, team_members }
            })
            .collect())
    }

    async fn notify_team(&self, task: &TaskRecord, text: String) -> Result<(), TaskServiceError> {
        if task.team.is_empty() {
            return Ok(());
        }

        let created = self
            .notices
            .create_notice(CreateNoticeParams {
                team: task.team.clone(),
                text,
                task: Some(task.id.clone()),
                noti_type: NoticeType::Alert,
            })
            .await;

        match created {
            Ok(_) => {
                self.notifications_changed().await;
                Ok(())
            }
            Err(err) => {
                warn!(
                    target = "planity::tasks",
                    task_id = %task.id,
                    error = %err,
                    "Task written but team notice failed"
                );
                Err(err.into())
            }
        }
    }

    async fn tasks_changed(&self) {
        if let Some(invalidator) = &self.cache_invalidator {
            let outcome = invalidator.tasks_changed().await;
            if !outcome.is_success() {
                debug!(target = "planity::tasks", "Task write kept despite failed invalidation");
            }
        }
    }

    async fn notifications_changed(&self) {
        if let Some(invalidator) = &self.cache_invalidator {
            let outcome = invalidator.notifications_changed().await;
            if !outcome.is_success() {
                debug!(target = "planity::tasks", "Team notice kept despite failed invalidation");
            }
        }
    }
}

fn visible_to(actor: &Principal, is_trashed: bool) -> TaskQueryFilter {
    TaskQueryFilter {
        is_trashed,
        member: (!actor.is_admin).then(|| actor.user_id.clone()),
        ..TaskQueryFilter::default()
    }
}

fn require_title(title: &str) -> Result<String, DomainError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::validation("title is required"));
    }
    Ok(title.to_string())
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn assignment_text(team: &[String], priority: TaskPriority, date: OffsetDateTime) -> String {
    let mut text = String::from("New task has been assigned to you");
    if team.len() > 1 {
        text.push_str(&format!(" and {} others.", team.len() - 1));
    }
    let date = date
        .format(NOTICE_DATE_FORMAT)
        .unwrap_or_else(|_| date.date().to_string());
    text.push_str(&format!(
        " The task priority is set a {} priority, so check and act accordingly. The task date is {date}. Thank you!!!",
        priority.as_str()
    ));
    text
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;
    use crate::application::repos::CreateUserParams;
    use crate::cache::{CacheConfig, CacheStore, MemoryBackend};
    use crate::infra::db::MemoryRepositories;

    struct Fixture {
        service: TaskService,
        repos: Arc<MemoryRepositories>,
        store: Arc<CacheStore>,
        admin: Principal,
        member: Principal,
    }

    async fn fixture() -> Fixture {
        let repos = Arc::new(MemoryRepositories::new());
        let config = CacheConfig::in_memory();
        let store = Arc::new(CacheStore::new(Arc::new(MemoryBackend::new()), &config));
        store.connect().await.expect("memory cache connects");
        let invalidator = Arc::new(CacheInvalidator::new(store.clone(), &config));

        let admin = repos
            .create_user(CreateUserParams {
                name: "Admin".into(),
                title: "Lead".into(),
                role: "Admin".into(),
                email: "admin@example.com".into(),
                is_admin: true,
            })
            .await
            .expect("admin");
        let member = repos
            .create_user(CreateUserParams {
                name: "Member".into(),
                title: "Engineer".into(),
                role: "Developer".into(),
                email: "member@example.com".into(),
                is_admin: false,
            })
            .await
            .expect("member");

        let service = TaskService::new(repos.clone(), repos.clone(), repos.clone())
            .with_cache_invalidator(invalidator);

        Fixture {
            service,
            repos,
            store,
            admin: Principal {
                user_id: admin.id,
                email: admin.email,
                is_admin: true,
            },
            member: Principal {
                user_id: member.id,
                email: member.email,
                is_admin: false,
            },
        }
    }

    fn create_command(title: &str, team: Vec<String>) -> CreateTaskCommand {
        CreateTaskCommand {
            title: title.to_string(),
            date: Some(datetime!(2024-05-01 0:00 UTC)),
            priority: TaskPriority::High,
            stage: TaskStage::Todo,
            team,
            assets: Vec::new(),
        }
    }

    #[test]
    fn assignment_text_mentions_team_and_date() {
        let team = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let text = assignment_text(&team, TaskPriority::High, datetime!(2024-05-01 0:00 UTC));
        assert!(text.starts_with("New task has been assigned to you and 2 others."));
        assert!(text.contains("set a high priority"));
        assert!(text.contains("Wed May 01 2024"));
    }

    #[tokio::test]
    async fn create_notifies_team_and_invalidates() {
        let f = fixture().await;
        let ttl = Duration::from_secs(60);
        let _ = f.store.set_raw("cache:/api/tasks?__scope=admin", "{}", ttl).await;
        let notices_key = format!("cache:/api/users/notifications?__scope={}", f.member.user_id);
        let _ = f.store.set_raw(&notices_key, "{}", ttl).await;

        let task = f
            .service
            .create(&f.admin, create_command("Ship", vec![f.member.user_id.clone()]))
            .await
            .expect("create");

        assert_eq!(task.activities.len(), 1);
        assert_eq!(task.activities[0].by, f.admin.user_id);
        assert!(f.store.get_raw("cache:/api/tasks?__scope=admin").await.is_none());
        assert!(f.store.get_raw(&notices_key).await.is_none());

        let unread = f.repos.list_unread(&f.member.user_id).await.expect("notices");
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].task.as_deref(), Some(task.id.as_str()));
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let f = fixture().await;
        let err = f
            .service
            .create(&f.admin, create_command("   ", Vec::new()))
            .await
            .expect_err("validation");
        assert!(matches!(
            err,
            TaskServiceError::Domain(DomainError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn members_only_see_their_tasks() {
        let f = fixture().await;
        f.service
            .create(&f.admin, create_command("Mine", vec![f.member.user_id.clone()]))
            .await
            .expect("create");
        f.service
            .create(&f.admin, create_command("Other", vec![f.admin.user_id.clone()]))
            .await
            .expect("create");

        let member_view = f
            .service
            .list(&f.member, None, false, None)
            .await
            .expect("list");
        assert_eq!(member_view.len(), 1);
        assert_eq!(member_view[0].task.title, "Mine");
        assert_eq!(member_view[0].team_members[0].name, "Member");

        let admin_view = f.service.list(&f.admin, None, false, None).await.expect("list");
        assert_eq!(admin_view.len(), 2);

        let searched = f
            .service
            .list(&f.admin, None, false, Some("oth".into()))
            .await
            .expect("search");
        assert_eq!(searched.len(), 1);
    }

    #[tokio::test]
    async fn trash_and_delete_restore_cycle() {
        let f = fixture().await;
        let first = f
            .service
            .create(&f.admin, create_command("One", Vec::new()))
            .await
            .expect("create");
        let second = f
            .service
            .create(&f.admin, create_command("Two", Vec::new()))
            .await
            .expect("create");

        f.service.trash(&first.id).await.expect("trash");
        f.service.trash(&second.id).await.expect("trash");
        let trashed = f.service.list(&f.admin, None, true, None).await.expect("list");
        assert_eq!(trashed.len(), 2);

        assert_eq!(
            f.service
                .delete_restore(&first.id, TrashAction::Restore)
                .await
                .expect("restore"),
            1
        );
        assert_eq!(
            f.service
                .delete_restore("", TrashAction::DeleteAll)
                .await
                .expect("delete all"),
            1
        );
        assert!(f.repos.find_task(&second.id).await.expect("find").is_none());
        assert!(!f.repos.find_task(&first.id).await.expect("find").expect("kept").is_trashed);

        let missing = f.service.delete_restore("nope", TrashAction::Delete).await;
        assert!(matches!(
            missing,
            Err(TaskServiceError::Domain(DomainError::NotFound { entity: "task" }))
        ));
    }

    #[tokio::test]
    async fn duplicate_copies_and_renames() {
        let f = fixture().await;
        let source = f
            .service
            .create(&f.admin, create_command("Plan", vec![f.member.user_id.clone()]))
            .await
            .expect("create");
        f.service
            .create_sub_task(CreateSubTaskCommand {
                task_id: source.id.clone(),
                title: "Draft".into(),
                tag: "docs".into(),
                date: None,
            })
            .await
            .expect("sub task");

        let copy = f.service.duplicate(&f.admin, &source.id).await.expect("duplicate");
        assert_eq!(copy.title, "Plan - Duplicate");
        assert_eq!(copy.sub_tasks.len(), 1);
        assert_eq!(copy.team, vec![f.member.user_id.clone()]);
        assert_ne!(copy.id, source.id);
    }

    #[tokio::test]
    async fn dashboard_counts_by_stage_and_priority() {
        let f = fixture().await;
        for title in ["a", "b", "c"] {
            f.service
                .create(&f.admin, create_command(title, vec![f.member.user_id.clone()]))
                .await
                .expect("create");
        }
        let low = CreateTaskCommand {
            priority: TaskPriority::Low,
            stage: TaskStage::Completed,
            ..create_command("d", Vec::new())
        };
        f.service.create(&f.admin, low).await.expect("create");

        let stats = f.service.dashboard(&f.admin).await.expect("dashboard");
        assert_eq!(stats.total_tasks, 4);
        assert_eq!(stats.tasks.get("todo"), Some(&3));
        assert_eq!(stats.tasks.get("completed"), Some(&1));
        assert_eq!(stats.tasks.get("in progress"), Some(&0));
        assert_eq!(
            stats.graph_data.iter().find(|point| point.name == "high").map(|p| p.total),
            Some(3)
        );
        assert_eq!(stats.users.len(), 2);

        let member_stats = f.service.dashboard(&f.member).await.expect("dashboard");
        assert_eq!(member_stats.total_tasks, 3);
        assert!(member_stats.users.is_empty());
    }

    #[tokio::test]
    async fn activity_requires_text_and_existing_task() {
        let f = fixture().await;
        let task = f
            .service
            .create(&f.admin, create_command("Fix", Vec::new()))
            .await
            .expect("create");

        let updated = f
            .service
            .post_activity(
                &f.member,
                PostActivityCommand {
                    task_id: task.id.clone(),
                    activity_type: ActivityType::Bug,
                    activity: "found a bug".into(),
                },
            )
            .await
            .expect("activity");
        assert_eq!(updated.activities.len(), 2);

        let missing = f
            .service
            .post_activity(
                &f.member,
                PostActivityCommand {
                    task_id: "missing".into(),
                    activity_type: ActivityType::Commented,
                    activity: "hello".into(),
                },
            )
            .await;
        assert!(matches!(
            missing,
            Err(TaskServiceError::Domain(DomainError::NotFound { .. }))
        ));
    }
}
