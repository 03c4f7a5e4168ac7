//! 存储管理层 - 可持久化的变更队列
//!
//! 双后端设计：
//! - 结构化后端（SQLite）：queue_id 主键 + created_at 排序索引
//! - 后备后端（sled KV）：整个队列序列化为单 key 下的 JSON 数组
//!
//! 后端在冷启动时探测一次、选定后进程生命周期内不再切换，
//! 避免两套存储之间出现脑裂状态（结构化后端中途失效会把已有
//! 条目变成孤儿，所以切换点只允许在启动时）。

use std::path::Path;
use tracing::{info, warn};

pub mod entities;
pub mod kv;
pub mod sqlite;

pub use entities::{MutationKind, PendingMutation, Task};
pub use kv::SledQueueStore;
pub use sqlite::SqliteQueueStore;

use crate::error::Result;

/// 队列后端统一契约
///
/// 约束（所有实现必须满足）：
/// - `list_all` 按 created_at 非递减顺序返回
/// - `append` 返回前已同步落盘
/// - `remove_by_ids` 对不存在的 id 无操作、不报错
#[async_trait::async_trait]
pub trait QueueBackend: std::fmt::Debug + Send + Sync {
    async fn append(&self, mutation: &PendingMutation) -> Result<()>;
    async fn list_all(&self) -> Result<Vec<PendingMutation>>;
    async fn remove_by_ids(&self, queue_ids: &[String]) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    async fn count(&self) -> Result<usize>;
}

/// 队列存储 - 启动时选定其一的双后端
#[derive(Debug)]
pub enum QueueStore {
    /// 结构化后端（首选）
    Structured(SqliteQueueStore),
    /// 序列化后备后端
    Fallback(SledQueueStore),
}

/// 结构化后端数据库文件名
const QUEUE_DB_FILE: &str = "pending-queue.db";
/// 后备后端目录名
const FALLBACK_KV_DIR: &str = "fallback-kv";

impl QueueStore {
    /// 打开队列存储：先探测结构化后端，失败则永久降级到后备后端
    ///
    /// 探测只发生在这里这一次，之后不做每次调用的重试。
    pub async fn open(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| crate::error::TaskSyncSDKError::IO(format!("创建数据目录失败: {}", e)))?;

        match SqliteQueueStore::open(&data_dir.join(QUEUE_DB_FILE)) {
            Ok(store) => {
                info!("队列存储使用结构化后端: {}", data_dir.display());
                Ok(QueueStore::Structured(store))
            }
            Err(e) => {
                warn!("结构化后端不可用，降级到 KV 后备后端: {}", e);
                let store = SledQueueStore::open(&data_dir.join(FALLBACK_KV_DIR))?;
                Ok(QueueStore::Fallback(store))
            }
        }
    }

    /// 当前是否运行在后备后端上
    pub fn is_fallback(&self) -> bool {
        matches!(self, QueueStore::Fallback(_))
    }
}

#[async_trait::async_trait]
impl QueueBackend for QueueStore {
    async fn append(&self, mutation: &PendingMutation) -> Result<()> {
        match self {
            QueueStore::Structured(s) => s.append(mutation).await,
            QueueStore::Fallback(s) => s.append(mutation).await,
        }
    }

    async fn list_all(&self) -> Result<Vec<PendingMutation>> {
        match self {
            QueueStore::Structured(s) => s.list_all().await,
            QueueStore::Fallback(s) => s.list_all().await,
        }
    }

    async fn remove_by_ids(&self, queue_ids: &[String]) -> Result<()> {
        match self {
            QueueStore::Structured(s) => s.remove_by_ids(queue_ids).await,
            QueueStore::Fallback(s) => s.remove_by_ids(queue_ids).await,
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            QueueStore::Structured(s) => s.clear().await,
            QueueStore::Fallback(s) => s.clear().await,
        }
    }

    async fn count(&self) -> Result<usize> {
        match self {
            QueueStore::Structured(s) => s.count().await,
            QueueStore::Fallback(s) => s.count().await,
        }
    }
}
