use std::sync::Arc;

use crate::application::auth::AuthService;
use crate::application::tasks::TaskService;
use crate::application::users::UserService;
use crate::cache::{CacheState, CacheStore};

#[derive(Clone)]
pub struct ApiState {
    pub auth: Arc<AuthService>,
    pub tasks: Arc<TaskService>,
    pub users: Arc<UserService>,
    /// Cache layer state for ordinary GET routes.
    pub cache: CacheState,
    /// Same store with the shorter dashboard TTL.
    pub dashboard_cache: CacheState,
}

impl ApiState {
    pub fn cache_store(&self) -> &Arc<CacheStore> {
        self.cache.store()
    }
}
