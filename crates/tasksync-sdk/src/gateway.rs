//! 远端任务网关
//!
//! 本模块提供：
//! - `TaskGateway` trait：对权威后端的 读取/改完成态/改字段 三个操作
//! - `InMemoryTaskGateway`：进程内实现（演示与测试用）
//!
//! 网关的所有调用都可能很慢、可能瞬时失败；本层之上不得假设有界延迟。
//! 失败分两类：`Transport`（瞬时，可重试）与 `NotFound`。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Result, TaskSyncSDKError};
use crate::storage::entities::{now_ms, Task};

/// 远端任务服务契约（真实实现由传输层提供，如 HTTP/gRPC 客户端）
#[async_trait]
pub trait TaskGateway: Send + Sync + std::fmt::Debug {
    /// 拉取权威任务列表
    async fn fetch_tasks(&self) -> Result<Vec<Task>>;

    /// 更新任务完成状态
    async fn update_completion(&self, task_id: &str, is_completed: bool) -> Result<()>;

    /// 编辑任务标题与详情
    async fn edit_task(&self, task_id: &str, title: &str, details: &str) -> Result<()>;
}

/// 进程内任务网关（演示与测试用）
///
/// 行为与真实后端对齐：写操作会推进 `updated_at`；
/// `fetch_tasks` 按 `updated_at` 降序返回；未知任务返回 NotFound。
/// `set_fail_transport(true)` 可模拟传输层整体故障。
#[derive(Debug)]
pub struct InMemoryTaskGateway {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
    fail_transport: AtomicBool,
}

impl InMemoryTaskGateway {
    /// 创建空网关
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            fail_transport: AtomicBool::new(false),
        }
    }

    /// 创建带演示种子数据的网关
    pub fn seeded() -> Self {
        let now = now_ms();
        let seed = vec![
            Task {
                task_id: "task-1001".to_string(),
                title: "搭建后端项目".to_string(),
                details: "创建服务端工程并配置认证密钥。".to_string(),
                is_completed: false,
                updated_at: now - 4000,
            },
            Task {
                task_id: "task-1002".to_string(),
                title: "设计登录流程".to_string(),
                details: "完成登录与注册界面。".to_string(),
                is_completed: true,
                updated_at: now - 3000,
            },
            Task {
                task_id: "task-1003".to_string(),
                title: "实现同步逻辑".to_string(),
                details: "为离线优先同步准备仓储层。".to_string(),
                is_completed: false,
                updated_at: now - 2000,
            },
        ];
        Self::with_tasks(seed)
    }

    /// 以给定任务集创建网关
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let map = tasks.into_iter().map(|t| (t.task_id.clone(), t)).collect();
        Self {
            tasks: Arc::new(RwLock::new(map)),
            fail_transport: AtomicBool::new(false),
        }
    }

    /// 开关传输层故障模拟
    pub fn set_fail_transport(&self, fail: bool) {
        self.fail_transport.store(fail, Ordering::SeqCst);
    }

    fn check_transport(&self) -> Result<()> {
        if self.fail_transport.load(Ordering::SeqCst) {
            return Err(TaskSyncSDKError::Transport("网络不可达".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryTaskGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskGateway for InMemoryTaskGateway {
    async fn fetch_tasks(&self) -> Result<Vec<Task>> {
        self.check_transport()?;

        let tasks = self.tasks.read().await;
        let mut list: Vec<Task> = tasks.values().cloned().collect();
        list.sort_by(|left, right| right.updated_at.cmp(&left.updated_at));
        Ok(list)
    }

    async fn update_completion(&self, task_id: &str, is_completed: bool) -> Result<()> {
        self.check_transport()?;

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskSyncSDKError::NotFound(format!("任务不存在: {}", task_id)))?;

        task.is_completed = is_completed;
        task.updated_at = now_ms();
        Ok(())
    }

    async fn edit_task(&self, task_id: &str, title: &str, details: &str) -> Result<()> {
        self.check_transport()?;

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskSyncSDKError::NotFound(format!("任务不存在: {}", task_id)))?;

        task.title = title.to_string();
        task.details = details.to_string();
        task.updated_at = now_ms();
        Ok(())
    }
}
