//! SQLite 存储模块 - 结构化队列后端
//!
//! 本模块提供：
//! - `queue_id` 主键唯一索引 + `created_at` 二级排序索引
//! - 同步落盘（synchronous=FULL），写入返回前即持久化
//! - 移动端进程可能随时被杀，不允许任何缓冲/延迟写

use std::path::Path;
use std::sync::Arc;
use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use crate::error::{Result, TaskSyncSDKError};
use crate::storage::entities::{MutationKind, PendingMutation};

/// 结构化队列后端（rusqlite）
#[derive(Debug)]
pub struct SqliteQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteQueueStore {
    /// 打开（或创建）队列数据库
    ///
    /// 打开失败即返回错误，由上层决定是否降级到 KV 后端。
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| TaskSyncSDKError::Database(format!("打开队列数据库失败: {}", e)))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| TaskSyncSDKError::Database(format!("设置 WAL 模式失败: {}", e)))?;

        // 进程随时可能被杀，必须保证 append 返回前已落盘
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| TaskSyncSDKError::Database(format!("设置同步模式失败: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS pending_mutations (
                queue_id     TEXT PRIMARY KEY,
                kind         TEXT NOT NULL,
                target_id    TEXT NOT NULL,
                title        TEXT,
                details      TEXT,
                is_completed INTEGER,
                created_at   INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_pending_mutations_created_at
             ON pending_mutations (created_at)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 追加一条变更记录
    pub async fn append(&self, mutation: &PendingMutation) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO pending_mutations
             (queue_id, kind, target_id, title, details, is_completed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                mutation.queue_id,
                mutation.kind.as_str(),
                mutation.target_id,
                mutation.title,
                mutation.details,
                mutation.is_completed,
                mutation.created_at,
            ],
        )?;
        Ok(())
    }

    /// 按 created_at 升序读取全部记录
    pub async fn list_all(&self) -> Result<Vec<PendingMutation>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT queue_id, kind, target_id, title, details, is_completed, created_at
             FROM pending_mutations
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<bool>>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;

        let mut mutations = Vec::new();
        for row in rows {
            let (queue_id, kind, target_id, title, details, is_completed, created_at) = row?;
            // 未知 kind 的行静默跳过，存储层只降级不报错
            let Some(kind) = MutationKind::parse(&kind) else {
                tracing::warn!("跳过未知变更类型的记录: queue_id={}", queue_id);
                continue;
            };
            mutations.push(PendingMutation {
                queue_id,
                kind,
                target_id,
                title,
                details,
                is_completed,
                created_at,
            });
        }

        Ok(mutations)
    }

    /// 按 queue_id 批量删除；不存在的 id 视为无操作
    pub async fn remove_by_ids(&self, queue_ids: &[String]) -> Result<()> {
        if queue_ids.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().await;
        for queue_id in queue_ids {
            conn.execute(
                "DELETE FROM pending_mutations WHERE queue_id = ?1",
                params![queue_id],
            )?;
        }
        Ok(())
    }

    /// 清空队列
    pub async fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM pending_mutations", [])?;
        Ok(())
    }

    /// 当前队列长度
    pub async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM pending_mutations", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
