//! Bearer-token authentication and password login.
//!
//! Tokens look like `pl_<prefix>_<secret>`. Only the prefix and a SHA-256 of
//! the secret are stored; verification compares hashes in constant time.
//! Passwords are stored as a salted SHA-256 and compared the same way.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::repos::{CreateUserParams, CredentialsRepo, RepoError, UsersRepo};
use crate::cache::CacheScope;
use crate::domain::entities::{AccessTokenRecord, PasswordRecord, UserRecord};

const TOKEN_PREFIX: &str = "pl";
const PREFIX_LEN: usize = 12;
const MIN_SECRET_LEN: usize = 32;
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid access token")]
    Invalid,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,
    #[error("user not found")]
    UserNotFound,
    #[error("user account is deactivated")]
    Inactive,
    #[error("admin privileges required")]
    Forbidden,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Authenticated caller attached to each protected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub is_admin: bool,
}

impl Principal {
    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }

    /// Admins see every task; everyone else sees only their own.
    pub fn cache_scope(&self) -> CacheScope {
        if self.is_admin {
            CacheScope::admin()
        } else {
            CacheScope::user(self.user_id.clone())
        }
    }
}

/// Administrator ensured at startup so a fresh deployment is reachable.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
    /// Fixed token to install; one is generated when absent.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub user: UserRecord,
    /// Set only when a token was generated during this run.
    pub generated_token: Option<String>,
}

/// Result of a successful password login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserRecord,
    /// Plaintext access token; shown once.
    pub token: String,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    credentials: Arc<dyn CredentialsRepo>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UsersRepo>, credentials: Arc<dyn CredentialsRepo>) -> Self {
        Self { users, credentials }
    }

    /// Mint a fresh token for `user_id`. The plaintext is returned once.
    pub async fn issue_token(&self, user_id: &str) -> Result<String, AuthError> {
        let prefix = Self::generate_prefix();
        let secret = Self::generate_secret();
        let token = format!("{TOKEN_PREFIX}_{prefix}_{secret}");

        self.credentials
            .store_token(AccessTokenRecord {
                prefix,
                hashed_secret: Self::hash_secret(&secret),
                user_id: user_id.to_string(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;

        Ok(token)
    }

    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let parsed = Self::parse_token(token).ok_or(AuthError::Invalid)?;
        let record = self
            .credentials
            .find_token(&parsed.prefix)
            .await?
            .ok_or(AuthError::Invalid)?;

        let hashed_input = Self::hash_secret(&parsed.secret);
        if record.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Err(AuthError::Invalid);
        }

        let user = self
            .users
            .find_user(&record.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        Ok(Principal {
            user_id: user.id,
            email: user.email,
            is_admin: user.is_admin,
        })
    }

    pub async fn revoke_user_tokens(&self, user_id: &str) -> Result<u64, AuthError> {
        Ok(self.credentials.revoke_user_tokens(user_id).await?)
    }

    /// Revoke the single token presented; other sessions stay valid.
    pub async fn logout(&self, token: &str) -> Result<bool, AuthError> {
        let parsed = Self::parse_token(token).ok_or(AuthError::Invalid)?;
        let revoked = self.credentials.revoke_token(&parsed.prefix).await?;
        debug!(target = "planity::auth", prefix = %parsed.prefix, revoked, "Token logged out");
        Ok(revoked)
    }

    /// Exchange an email and password for a fresh token.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let user = self
            .users
            .find_user_by_email(email.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let stored = self
            .credentials
            .find_password(&user.id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let hashed_input = Self::hash_password(&stored.salt, password);
        if stored.hashed_password.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        let token = self.issue_token(&user.id).await?;
        info!(target = "planity::auth", user_id = %user.id, "User logged in");
        Ok(LoginOutcome { user, token })
    }

    /// Replace the password of `user_id`. Issued tokens stay valid.
    pub async fn set_password(&self, user_id: &str, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        let salt = Uuid::new_v4().as_bytes().to_vec();
        let hashed_password = Self::hash_password(&salt, password);
        self.credentials
            .store_password(PasswordRecord {
                user_id: user_id.to_string(),
                salt,
                hashed_password,
                updated_at: OffsetDateTime::now_utc(),
            })
            .await
            .map_err(|err| match err {
                RepoError::NotFound => AuthError::UserNotFound,
                other => other.into(),
            })
    }

    /// Ensure the configured administrator exists and holds a usable token.
    pub async fn bootstrap_admin(
        &self,
        admin: &BootstrapAdmin,
    ) -> Result<BootstrapOutcome, AuthError> {
        let user = match self.users.find_user_by_email(&admin.email).await? {
            Some(user) => user,
            None => {
                let user = self
                    .users
                    .create_user(CreateUserParams {
                        name: admin.name.clone(),
                        title: "Administrator".to_string(),
                        role: "Admin".to_string(),
                        email: admin.email.clone(),
                        is_admin: true,
                    })
                    .await?;
                info!(
                    target = "planity::auth",
                    user_id = %user.id,
                    email = %user.email,
                    "Bootstrap administrator created"
                );
                user
            }
        };

        let generated_token = match admin.token.as_deref() {
            Some(token) => {
                self.install_token(&user.id, token).await?;
                None
            }
            None => Some(self.issue_token(&user.id).await?),
        };

        Ok(BootstrapOutcome {
            user,
            generated_token,
        })
    }

    async fn install_token(&self, user_id: &str, token: &str) -> Result<(), AuthError> {
        let parsed = Self::parse_token(token).ok_or(AuthError::Invalid)?;
        if self.credentials.find_token(&parsed.prefix).await?.is_some() {
            return Ok(());
        }
        self.credentials
            .store_token(AccessTokenRecord {
                prefix: parsed.prefix,
                hashed_secret: Self::hash_secret(&parsed.secret),
                user_id: user_id.to_string(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;
        Ok(())
    }

    fn hash_secret(secret: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.finalize().to_vec()
    }

    fn hash_password(salt: &[u8], password: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hasher.finalize().to_vec()
    }

    fn generate_prefix() -> String {
        Uuid::new_v4().simple().to_string()[..PREFIX_LEN].to_string()
    }

    fn generate_secret() -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    fn parse_token(token: &str) -> Option<ParsedToken> {
        let mut parts = token.trim().splitn(3, '_');
        if parts.next()? != TOKEN_PREFIX {
            return None;
        }
        let prefix = parts.next()?;
        let secret = parts.next()?;
        if prefix.is_empty() || secret.len() < MIN_SECRET_LEN {
            return None;
        }
        Some(ParsedToken {
            prefix: prefix.to_string(),
            secret: secret.to_string(),
        })
    }
}

struct ParsedToken {
    prefix: String,
    secret: String,
}
