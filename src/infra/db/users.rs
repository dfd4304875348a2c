use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use crate::application::repos::{CreateUserParams, RepoError, UpdateProfileParams, UsersRepo};
use crate::domain::entities::UserRecord;

use super::{MemoryRepositories, newest_first};

const EMAIL_CONSTRAINT: &str = "users_email_key";

#[async_trait]
impl UsersRepo for MemoryRepositories {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let id = Self::new_id();
        match self.emails.entry(params.email.to_ascii_lowercase()) {
            Entry::Occupied(_) => {
                return Err(RepoError::Duplicate {
                    constraint: EMAIL_CONSTRAINT.to_string(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        let now = OffsetDateTime::now_utc();
        let user = UserRecord {
            id: id.clone(),
            name: params.name,
            title: params.title,
            role: params.role,
            email: params.email,
            is_admin: params.is_admin,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, self.row(user.clone()));
        Ok(user)
    }

    async fn find_user(&self, id: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.users.get(id).map(|row| row.record.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let Some(id) = self
            .emails
            .get(&email.to_ascii_lowercase())
            .map(|id| id.value().clone())
        else {
            return Ok(None);
        };
        self.find_user(&id).await
    }

    async fn find_users(&self, ids: &[String]) -> Result<Vec<UserRecord>, RepoError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|row| row.record.clone()))
            .collect())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, RepoError> {
        Ok(newest_first(
            self.users.iter().map(|entry| entry.value().clone()),
        ))
    }

    async fn update_profile(&self, params: UpdateProfileParams) -> Result<UserRecord, RepoError> {
        let mut row = self.users.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        let user = &mut row.record;
        if let Some(name) = params.name {
            user.name = name;
        }
        if let Some(title) = params.title {
            user.title = title;
        }
        if let Some(role) = params.role {
            user.role = role;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn set_active(&self, id: &str, is_active: bool) -> Result<UserRecord, RepoError> {
        let mut row = self.users.get_mut(id).ok_or(RepoError::NotFound)?;
        row.record.is_active = is_active;
        row.record.updated_at = OffsetDateTime::now_utc();
        Ok(row.record.clone())
    }

    async fn delete_user(&self, id: &str) -> Result<(), RepoError> {
        let (_, row) = self.users.remove(id).ok_or(RepoError::NotFound)?;
        self.emails
            .remove_if(&row.record.email.to_ascii_lowercase(), |_, owner| owner == id);
        self.passwords.remove(id);
        Ok(())
    }
}
