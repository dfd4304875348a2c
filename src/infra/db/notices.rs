use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CreateNoticeParams, NoticesRepo, RepoError};
use crate::domain::entities::NoticeRecord;

use super::{MemoryRepositories, newest_first};

#[async_trait]
impl NoticesRepo for MemoryRepositories {
    async fn create_notice(&self, params: CreateNoticeParams) -> Result<NoticeRecord, RepoError> {
        if params.team.is_empty() {
            return Err(RepoError::InvalidInput {
                message: "notice needs at least one recipient".to_string(),
            });
        }

        let now = OffsetDateTime::now_utc();
        let notice = NoticeRecord {
            id: Self::new_id(),
            team: params.team,
            text: params.text,
            task: params.task,
            noti_type: params.noti_type,
            is_read: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.notices
            .insert(notice.id.clone(), self.row(notice.clone()));
        Ok(notice)
    }

    async fn list_unread(&self, user_id: &str) -> Result<Vec<NoticeRecord>, RepoError> {
        Ok(newest_first(
            self.notices
                .iter()
                .filter(|entry| entry.record.is_unread_by(user_id))
                .map(|entry| entry.value().clone()),
        ))
    }

    async fn mark_read(&self, user_id: &str, notice_id: &str) -> Result<bool, RepoError> {
        let Some(mut row) = self.notices.get_mut(notice_id) else {
            return Ok(false);
        };
        if !row.record.is_unread_by(user_id) {
            return Ok(false);
        }
        row.record.is_read.push(user_id.to_string());
        row.record.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64, RepoError> {
        let now = OffsetDateTime::now_utc();
        let mut marked = 0;
        for mut row in self.notices.iter_mut() {
            if row.record.is_unread_by(user_id) {
                row.record.is_read.push(user_id.to_string());
                row.record.updated_at = now;
                marked += 1;
            }
        }
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::NoticeType;

    fn params(team: &[&str], text: &str) -> CreateNoticeParams {
        CreateNoticeParams {
            team: team.iter().map(|id| id.to_string()).collect(),
            text: text.into(),
            task: None,
            noti_type: NoticeType::Alert,
        }
    }

    #[tokio::test]
    async fn unread_is_per_recipient() {
        let repos = MemoryRepositories::new();
        let notice = repos
            .create_notice(params(&["u1", "u2"], "hello"))
            .await
            .expect("create");

        assert!(repos.mark_read("u1", &notice.id).await.expect("mark"));
        assert!(!repos.mark_read("u1", &notice.id).await.expect("mark again"));
        assert!(!repos.mark_read("u3", &notice.id).await.expect("not addressed"));

        assert!(repos.list_unread("u1").await.expect("list").is_empty());
        assert_eq!(repos.list_unread("u2").await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn empty_team_is_rejected() {
        let repos = MemoryRepositories::new();
        assert!(matches!(
            repos.create_notice(params(&[], "nobody")).await,
            Err(RepoError::InvalidInput { .. })
        ));
    }
}
