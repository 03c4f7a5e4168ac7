//! KV 存储模块 - 基于 sled 的序列化队列后备后端
//!
//! 本模块提供：
//! - 整个队列编码为一个 JSON 数组，存放在单一固定 key 之下
//! - 读取时逐条校验，形状不对的记录静默丢弃（存储降级而非整体损坏）
//! - 每次写入 `flush_async` 落盘后才返回

use std::path::Path;
use sled::Db;

use crate::error::{Result, TaskSyncSDKError};
use crate::storage::entities::PendingMutation;

/// 队列在 KV 存储中的固定 key
pub const QUEUE_BLOB_KEY: &str = "tasksync:pending-queue";

/// 序列化队列后备后端（sled）
#[derive(Debug)]
pub struct SledQueueStore {
    db: Db,
}

impl SledQueueStore {
    /// 打开（或创建）KV 存储
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| TaskSyncSDKError::KvStore(format!("打开 sled 数据库失败: {}", e)))?;
        Ok(Self { db })
    }

    /// 读出整个队列（升序），坏记录与坏 blob 一律按空处理
    async fn read_queue(&self) -> Result<Vec<PendingMutation>> {
        let stored = self
            .db
            .get(QUEUE_BLOB_KEY)
            .map_err(|e| TaskSyncSDKError::KvStore(format!("读取队列失败: {}", e)))?;

        let Some(bytes) = stored else {
            return Ok(Vec::new());
        };

        // blob 解析失败按空队列处理，绝不报错
        let Ok(parsed) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            tracing::warn!("队列 blob 解析失败，按空队列处理");
            return Ok(Vec::new());
        };
        let Some(items) = parsed.as_array() else {
            tracing::warn!("队列 blob 不是数组，按空队列处理");
            return Ok(Vec::new());
        };

        let mut queue: Vec<PendingMutation> = items
            .iter()
            .filter_map(PendingMutation::sanitize)
            .collect();
        queue.sort_by_key(|m| m.created_at);

        Ok(queue)
    }

    /// 整体写回并落盘
    async fn write_queue(&self, queue: &[PendingMutation]) -> Result<()> {
        let bytes = serde_json::to_vec(queue)
            .map_err(|e| TaskSyncSDKError::Serialization(format!("序列化队列失败: {}", e)))?;

        self.db
            .insert(QUEUE_BLOB_KEY, bytes)
            .map_err(|e| TaskSyncSDKError::KvStore(format!("写入队列失败: {}", e)))?;

        self.db
            .flush_async()
            .await
            .map_err(|e| TaskSyncSDKError::KvStore(format!("队列落盘失败: {}", e)))?;

        Ok(())
    }

    /// 追加一条变更记录
    pub async fn append(&self, mutation: &PendingMutation) -> Result<()> {
        let mut queue = self.read_queue().await?;
        queue.push(mutation.clone());
        queue.sort_by_key(|m| m.created_at);
        self.write_queue(&queue).await
    }

    /// 按 created_at 升序读取全部记录
    pub async fn list_all(&self) -> Result<Vec<PendingMutation>> {
        self.read_queue().await
    }

    /// 按 queue_id 批量删除；不存在的 id 视为无操作
    pub async fn remove_by_ids(&self, queue_ids: &[String]) -> Result<()> {
        if queue_ids.is_empty() {
            return Ok(());
        }

        let queue = self.read_queue().await?;
        let next: Vec<PendingMutation> = queue
            .into_iter()
            .filter(|m| !queue_ids.contains(&m.queue_id))
            .collect();
        self.write_queue(&next).await
    }

    /// 清空队列
    pub async fn clear(&self) -> Result<()> {
        self.db
            .remove(QUEUE_BLOB_KEY)
            .map_err(|e| TaskSyncSDKError::KvStore(format!("清空队列失败: {}", e)))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| TaskSyncSDKError::KvStore(format!("队列落盘失败: {}", e)))?;
        Ok(())
    }

    /// 当前队列长度
    pub async fn count(&self) -> Result<usize> {
        Ok(self.read_queue().await?.len())
    }
}
