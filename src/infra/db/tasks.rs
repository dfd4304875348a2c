use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{
    CreateTaskParams, RepoError, TaskQueryFilter, TasksRepo, UpdateTaskParams,
};
use crate::domain::entities::{ActivityRecord, SubTaskRecord, TaskRecord};

use super::{MemoryRepositories, newest_first};

fn matches(task: &TaskRecord, filter: &TaskQueryFilter) -> bool {
    if task.is_trashed != filter.is_trashed {
        return false;
    }
    if filter.stage.is_some_and(|stage| task.stage != stage) {
        return false;
    }
    if filter
        .member
        .as_deref()
        .is_some_and(|member| !task.has_member(member))
    {
        return false;
    }
    if let Some(search) = filter.search.as_deref() {
        let needle = search.trim().to_lowercase();
        let hit = task.title.to_lowercase().contains(&needle)
            || task.stage.as_str().contains(&needle)
            || task.priority.as_str().contains(&needle);
        if !hit {
            return false;
        }
    }
    true
}

impl MemoryRepositories {
    fn modify_task(
        &self,
        id: &str,
        apply: impl FnOnce(&mut TaskRecord),
    ) -> Result<TaskRecord, RepoError> {
        let mut row = self.tasks.get_mut(id).ok_or(RepoError::NotFound)?;
        apply(&mut row.record);
        row.record.updated_at = OffsetDateTime::now_utc();
        Ok(row.record.clone())
    }
}

#[async_trait]
impl TasksRepo for MemoryRepositories {
    async fn create_task(&self, params: CreateTaskParams) -> Result<TaskRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let task = TaskRecord {
            id: Self::new_id(),
            title: params.title,
            date: params.date,
            priority: params.priority,
            stage: params.stage,
            activities: params.activities,
            sub_tasks: params.sub_tasks,
            assets: params.assets,
            team: params.team,
            is_trashed: false,
            created_at: now,
            updated_at: now,
        };
        self.tasks.insert(task.id.clone(), self.row(task.clone()));
        Ok(task)
    }

    async fn find_task(&self, id: &str) -> Result<Option<TaskRecord>, RepoError> {
        Ok(self.tasks.get(id).map(|row| row.record.clone()))
    }

    async fn list_tasks(&self, filter: &TaskQueryFilter) -> Result<Vec<TaskRecord>, RepoError> {
        Ok(newest_first(
            self.tasks
                .iter()
                .filter(|entry| matches(&entry.record, filter))
                .map(|entry| entry.value().clone()),
        ))
    }

    async fn update_task(&self, params: UpdateTaskParams) -> Result<TaskRecord, RepoError> {
        self.modify_task(&params.id, |task| {
            task.title = params.title;
            task.date = params.date;
            task.priority = params.priority;
            task.stage = params.stage;
            task.team = params.team;
            task.assets = params.assets;
        })
    }

    async fn push_activity(
        &self,
        id: &str,
        activity: ActivityRecord,
    ) -> Result<TaskRecord, RepoError> {
        self.modify_task(id, |task| task.activities.push(activity))
    }

    async fn push_sub_task(
        &self,
        id: &str,
        sub_task: SubTaskRecord,
    ) -> Result<TaskRecord, RepoError> {
        self.modify_task(id, |task| task.sub_tasks.push(sub_task))
    }

    async fn set_trashed(&self, id: &str, is_trashed: bool) -> Result<TaskRecord, RepoError> {
        self.modify_task(id, |task| task.is_trashed = is_trashed)
    }

    async fn restore_all(&self) -> Result<u64, RepoError> {
        let now = OffsetDateTime::now_utc();
        let mut restored = 0;
        for mut row in self.tasks.iter_mut() {
            if row.record.is_trashed {
                row.record.is_trashed = false;
                row.record.updated_at = now;
                restored += 1;
            }
        }
        Ok(restored)
    }

    async fn delete_task(&self, id: &str) -> Result<(), RepoError> {
        self.tasks.remove(id).map(|_| ()).ok_or(RepoError::NotFound)
    }

    async fn delete_trashed(&self) -> Result<u64, RepoError> {
        let before = self.tasks.len();
        self.tasks.retain(|_, row| !row.record.is_trashed);
        Ok(before.saturating_sub(self.tasks.len()) as u64)
    }
}
