use async_trait::async_trait;

use crate::application::repos::{CredentialsRepo, RepoError};
use crate::domain::entities::{AccessTokenRecord, PasswordRecord};

use super::MemoryRepositories;

#[async_trait]
impl CredentialsRepo for MemoryRepositories {
    async fn store_token(&self, record: AccessTokenRecord) -> Result<(), RepoError> {
        if self.tokens.contains_key(&record.prefix) {
            return Err(RepoError::Duplicate {
                constraint: "access_tokens_prefix_key".to_string(),
            });
        }
        self.tokens.insert(record.prefix.clone(), record);
        Ok(())
    }

    async fn find_token(&self, prefix: &str) -> Result<Option<AccessTokenRecord>, RepoError> {
        Ok(self.tokens.get(prefix).map(|record| record.value().clone()))
    }

    async fn revoke_token(&self, prefix: &str) -> Result<bool, RepoError> {
        Ok(self.tokens.remove(prefix).is_some())
    }

    async fn revoke_user_tokens(&self, user_id: &str) -> Result<u64, RepoError> {
        let before = self.tokens.len();
        self.tokens.retain(|_, record| record.user_id != user_id);
        Ok(before.saturating_sub(self.tokens.len()) as u64)
    }

    async fn store_password(&self, record: PasswordRecord) -> Result<(), RepoError> {
        if !self.users.contains_key(&record.user_id) {
            return Err(RepoError::NotFound);
        }
        self.passwords.insert(record.user_id.clone(), record);
        Ok(())
    }

    async fn find_password(&self, user_id: &str) -> Result<Option<PasswordRecord>, RepoError> {
        Ok(self.passwords.get(user_id).map(|record| record.value().clone()))
    }
}
