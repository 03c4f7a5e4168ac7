use std::fmt;
use rusqlite;

#[derive(Debug)]
pub enum TaskSyncSDKError {
    SqliteError(rusqlite::Error),
    JsonError(String),
    IO(String),
    KvStore(String),
    Database(String),
    Serialization(String),
    Transport(String),
    NotFound(String),
    Config(String),
    InvalidData(String),
    Other(String),
}

impl fmt::Display for TaskSyncSDKError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskSyncSDKError::SqliteError(e) => write!(f, "SQLite error: {}", e),
            TaskSyncSDKError::JsonError(e) => write!(f, "JSON error: {}", e),
            TaskSyncSDKError::IO(e) => write!(f, "IO error: {}", e),
            TaskSyncSDKError::KvStore(e) => write!(f, "KV store error: {}", e),
            TaskSyncSDKError::Database(e) => write!(f, "Database error: {}", e),
            TaskSyncSDKError::Serialization(e) => write!(f, "Serialization error: {}", e),
            TaskSyncSDKError::Transport(e) => write!(f, "Transport error: {}", e),
            TaskSyncSDKError::NotFound(e) => write!(f, "Not found: {}", e),
            TaskSyncSDKError::Config(e) => write!(f, "Config error: {}", e),
            TaskSyncSDKError::InvalidData(e) => write!(f, "Invalid data: {}", e),
            TaskSyncSDKError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl std::error::Error for TaskSyncSDKError {}

impl From<rusqlite::Error> for TaskSyncSDKError {
    fn from(error: rusqlite::Error) -> Self {
        TaskSyncSDKError::SqliteError(error)
    }
}

impl From<serde_json::Error> for TaskSyncSDKError {
    fn from(error: serde_json::Error) -> Self {
        TaskSyncSDKError::JsonError(error.to_string())
    }
}

impl From<std::io::Error> for TaskSyncSDKError {
    fn from(error: std::io::Error) -> Self {
        TaskSyncSDKError::IO(error.to_string())
    }
}

impl TaskSyncSDKError {
    /// 判断是否是瞬时性远端失败（可通过排队 / 下次同步恢复，绝不上抛给 UI 层）
    pub fn is_transient(&self) -> bool {
        matches!(self, TaskSyncSDKError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, TaskSyncSDKError>;
