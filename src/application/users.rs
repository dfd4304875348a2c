//! User, team and notification use cases.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::application::auth::{AuthError, AuthService, MIN_PASSWORD_LEN, Principal};
use crate::application::repos::{
    CreateUserParams, NoticesRepo, RepoError, UpdateProfileParams, UsersRepo,
};
use crate::cache::CacheInvalidator;
use crate::domain::entities::{NoticeRecord, UserRecord};
use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum UserServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

fn user_not_found(err: RepoError) -> UserServiceError {
    match err {
        RepoError::NotFound => DomainError::not_found("user").into(),
        other => other.into(),
    }
}

#[derive(Debug, Clone)]
pub struct RegisterUserCommand {
    pub name: String,
    pub title: String,
    pub role: String,
    pub email: String,
    pub is_admin: bool,
    /// Enables password login when set.
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfileCommand {
    /// Another user to edit; honoured for administrators only.
    pub target: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadTarget {
    All,
    One(String),
}

#[derive(Debug, Clone)]
pub struct RegisteredUser {
    pub user: UserRecord,
    /// Plaintext access token; shown once.
    pub token: String,
}

pub struct UserService {
    users: Arc<dyn UsersRepo>,
    notices: Arc<dyn NoticesRepo>,
    auth: Arc<AuthService>,
    cache_invalidator: Option<Arc<CacheInvalidator>>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        notices: Arc<dyn NoticesRepo>,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            users,
            notices,
            auth,
            cache_invalidator: None,
        }
    }

    pub fn with_cache_invalidator(mut self, invalidator: Arc<CacheInvalidator>) -> Self {
        self.cache_invalidator = Some(invalidator);
        self
    }

    pub async fn register(
        &self,
        command: RegisterUserCommand,
    ) -> Result<RegisteredUser, UserServiceError> {
        let name = required("name", &command.name)?;
        let email = required("email", &command.email)?.to_ascii_lowercase();
        if !email.contains('@') {
            return Err(DomainError::validation("email is not valid").into());
        }
        if command
            .password
            .as_deref()
            .is_some_and(|password| password.chars().count() < MIN_PASSWORD_LEN)
        {
            return Err(AuthError::WeakPassword.into());
        }
        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(DomainError::conflict("User already exists").into());
        }

        let user = self
            .users
            .create_user(CreateUserParams {
                name,
                title: command.title.trim().to_string(),
                role: command.role.trim().to_string(),
                email,
                is_admin: command.is_admin,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => DomainError::conflict("User already exists").into(),
                other => UserServiceError::from(other),
            })?;
        self.users_changed().await;

        if let Some(password) = command.password.as_deref() {
            self.auth.set_password(&user.id, password).await?;
        }
        let token = self.auth.issue_token(&user.id).await?;
        info!(target = "planity::users", user_id = %user.id, "User registered");
        Ok(RegisteredUser { user, token })
    }

    pub async fn team(&self) -> Result<Vec<UserRecord>, UserServiceError> {
        Ok(self.users.list_users().await?)
    }

    pub async fn notifications(
        &self,
        actor: &Principal,
    ) -> Result<Vec<NoticeRecord>, UserServiceError> {
        Ok(self.notices.list_unread(&actor.user_id).await?)
    }

    pub async fn update_profile(
        &self,
        actor: &Principal,
        command: UpdateProfileCommand,
    ) -> Result<UserRecord, UserServiceError> {
        let id = match command.target {
            Some(target) if actor.is_admin && !target.is_empty() => target,
            _ => actor.user_id.clone(),
        };

        let user = self
            .users
            .update_profile(UpdateProfileParams {
                id,
                name: trimmed(command.name),
                title: trimmed(command.title),
                role: trimmed(command.role),
            })
            .await
            .map_err(user_not_found)?;
        self.users_changed().await;
        Ok(user)
    }

    /// Returns the number of notices newly marked read.
    pub async fn mark_notifications_read(
        &self,
        actor: &Principal,
        target: ReadTarget,
    ) -> Result<u64, UserServiceError> {
        let marked = match target {
            ReadTarget::All => self.notices.mark_all_read(&actor.user_id).await?,
            ReadTarget::One(id) => u64::from(self.notices.mark_read(&actor.user_id, &id).await?),
        };
        self.notifications_changed().await;
        Ok(marked)
    }

    /// Replace the caller's own password.
    pub async fn change_password(
        &self,
        actor: &Principal,
        password: &str,
    ) -> Result<(), UserServiceError> {
        self.auth.set_password(&actor.user_id, password).await?;
        self.users_changed().await;
        info!(target = "planity::users", user_id = %actor.user_id, "Password changed");
        Ok(())
    }

    pub async fn set_active(
        &self,
        user_id: &str,
        is_active: bool,
    ) -> Result<UserRecord, UserServiceError> {
        let user = self
            .users
            .set_active(user_id, is_active)
            .await
            .map_err(user_not_found)?;
        self.users_changed().await;
        info!(
            target = "planity::users",
            user_id = %user.id,
            is_active,
            "User activation changed"
        );
        Ok(user)
    }

    pub async fn delete(&self, user_id: &str) -> Result<(), UserServiceError> {
        self.users.delete_user(user_id).await.map_err(user_not_found)?;
        self.users_changed().await;
        self.auth.revoke_user_tokens(user_id).await?;
        info!(target = "planity::users", user_id, "User deleted");
        Ok(())
    }

    async fn users_changed(&self) {
        if let Some(invalidator) = &self.cache_invalidator {
            let outcome = invalidator.users_changed().await;
            if !outcome.is_success() {
                debug!(target = "planity::users", "User write kept despite failed invalidation");
            }
        }
    }

    async fn notifications_changed(&self) {
        if let Some(invalidator) = &self.cache_invalidator {
            let outcome = invalidator.notifications_changed().await;
            if !outcome.is_success() {
                debug!(target = "planity::users", "Read marks kept despite failed invalidation");
            }
        }
    }
}

fn required(field: &str, value: &str) -> Result<String, DomainError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
