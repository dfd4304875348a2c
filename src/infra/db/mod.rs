//! In-process repository implementations.
//!
//! Records live in concurrent maps for the lifetime of the process. Each row
//! carries an insertion sequence so listings have a stable newest-first order
//! even when timestamps collide.

mod credentials;
mod notices;
mod tasks;
mod users;

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::entities::{
    AccessTokenRecord, NoticeRecord, PasswordRecord, TaskRecord, UserRecord,
};

#[derive(Debug, Clone)]
struct Row<T> {
    seq: u64,
    record: T,
}

#[derive(Debug, Default)]
pub struct MemoryRepositories {
    sequence: AtomicU64,
    users: DashMap<String, Row<UserRecord>>,
    /// Lower-cased email to user id.
    emails: DashMap<String, String>,
    tokens: DashMap<String, AccessTokenRecord>,
    /// Keyed by user id.
    passwords: DashMap<String, PasswordRecord>,
    tasks: DashMap<String, Row<TaskRecord>>,
    notices: DashMap<String, Row<NoticeRecord>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed user, replacing any with the same id.
    pub fn seed_user(&self, user: UserRecord) {
        self.emails
            .insert(user.email.to_ascii_lowercase(), user.id.clone());
        let row = self.row(user);
        self.users.insert(row.record.id.clone(), row);
    }

    /// Insert a fully formed task, replacing any with the same id.
    pub fn seed_task(&self, task: TaskRecord) {
        let row = self.row(task);
        self.tasks.insert(row.record.id.clone(), row);
    }

    fn row<T>(&self, record: T) -> Row<T> {
        Row {
            seq: self.sequence.fetch_add(1, Ordering::Relaxed),
            record,
        }
    }

    fn new_id() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Clone records out of `rows`, newest first.
fn newest_first<T: Clone>(rows: impl Iterator<Item = Row<T>>) -> Vec<T> {
    let mut rows: Vec<Row<T>> = rows.collect();
    rows.sort_by(|left, right| right.seq.cmp(&left.seq));
    rows.into_iter().map(|row| row.record).collect()
}
