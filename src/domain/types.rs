//! Shared domain enumerations with their wire spellings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum TaskStage {
    #[default]
    #[serde(rename = "todo")]
    Todo,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
}

impl TaskStage {
    pub const ALL: [TaskStage; 3] = [Self::Todo, Self::InProgress, Self::Completed];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStage::Todo => "todo",
            TaskStage::InProgress => "in progress",
            TaskStage::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Medium,
    #[default]
    Normal,
    Low,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [Self::High, Self::Medium, Self::Normal, Self::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ActivityType {
    #[default]
    #[serde(rename = "assigned")]
    Assigned,
    #[serde(rename = "started")]
    Started,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "bug")]
    Bug,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "commented")]
    Commented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoticeType {
    #[default]
    Alert,
    Message,
}

/// `actionType` of the delete/restore endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrashAction {
    Delete,
    DeleteAll,
    Restore,
    RestoreAll,
}
