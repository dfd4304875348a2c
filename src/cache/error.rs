//! Cache error taxonomy.
//!
//! None of these ever reach an HTTP client: the store adapter logs them and
//! degrades to a miss or a no-op.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached, or a live connection was lost.
    #[error("cache connection error: {0}")]
    Connection(String),
    /// An operation was attempted before `connect` succeeded or after `quit`.
    #[error("cache backend is not connected")]
    NotConnected,
    #[error("cache operation `{op}` timed out after {timeout_ms} ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Coarse class used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::NotConnected | Self::Timeout { .. } | Self::Backend(_) => "operation",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Whether the error means the connection itself is unusable.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::NotConnected)
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
