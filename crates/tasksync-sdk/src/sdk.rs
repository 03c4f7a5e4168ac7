//! 统一 SDK 接口 - TaskSyncSDK 主入口
//!
//! 分层架构设计：
//! ```text
//! TaskSyncSDK (组合与生命周期层)
//!   ├── TaskRepository (变更队列仓储层)
//!   ├── SyncManager    (同步调度层)
//!   ├── NetworkMonitor (网络监控层)
//!   ├── QueueStore     (持久化队列存储层)
//!   └── TaskGateway    (远端任务网关)
//! ```
//!
//! 设计原则：
//! - 异步优先：全部公开 API 使用 async/await
//! - 依赖注入：网关与网络探测器由上层显式传入，不用全局可变状态
//! - 边界干净：跨出本层的只有普通数据（计数、布尔、任务快照），没有 UI 类型
//! - 错误收敛：瞬时远端失败绝不作为错误穿透到调用方

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::error::Result;
use crate::gateway::{InMemoryTaskGateway, TaskGateway};
use crate::network::{ConnectivityProbe, NetworkMonitor, NetworkStatusEvent, StaticConnectivityProbe};
use crate::repository::{QueueOutcome, SyncOutcome, TaskRepository};
use crate::storage::entities::Task;
use crate::storage::QueueStore;
use crate::sync::SyncManager;
use crate::version::SDK_VERSION;

/// TaskSync SDK 配置
#[derive(Debug, Clone)]
pub struct TaskSyncConfig {
    /// 数据存储目录（队列数据库 / KV 后备存储都放在这里）
    pub data_dir: PathBuf,
    /// 初始化后是否自动启动「网络恢复即同步」
    pub auto_sync_enabled: bool,
    /// 同步结果广播通道容量
    pub sync_channel_capacity: usize,
}

impl Default for TaskSyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tasksync-data"),
            auto_sync_enabled: true,
            sync_channel_capacity: 64,
        }
    }
}

/// TaskSyncConfig 构建器
#[derive(Debug, Default)]
pub struct TaskSyncConfigBuilder {
    config: TaskSyncConfig,
}

impl TaskSyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TaskSyncConfig::default(),
        }
    }

    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = data_dir.into();
        self
    }

    pub fn auto_sync_enabled(mut self, enabled: bool) -> Self {
        self.config.auto_sync_enabled = enabled;
        self
    }

    pub fn sync_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.sync_channel_capacity = capacity;
        self
    }

    pub fn build(self) -> TaskSyncConfig {
        self.config
    }
}

impl TaskSyncConfig {
    pub fn builder() -> TaskSyncConfigBuilder {
        TaskSyncConfigBuilder::new()
    }
}

/// TaskSync SDK 主入口
#[derive(Debug)]
pub struct TaskSyncSDK {
    config: TaskSyncConfig,
    monitor: Arc<NetworkMonitor>,
    repository: Arc<TaskRepository>,
    sync_manager: Arc<SyncManager>,
}

impl TaskSyncSDK {
    /// 初始化 SDK
    ///
    /// 组装 存储 → 仓储 → 同步管理器，启动网络监控；
    /// 配置允许时同时启动自动同步。
    pub async fn initialize(
        config: TaskSyncConfig,
        gateway: Arc<dyn TaskGateway>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Result<Arc<Self>> {
        let store = QueueStore::open(&config.data_dir).await?;

        let monitor = Arc::new(NetworkMonitor::new(probe));
        monitor.start().await?;

        let repository = Arc::new(TaskRepository::new(store, monitor.clone(), gateway));
        let sync_manager = Arc::new(SyncManager::new(
            repository.clone(),
            monitor.clone(),
            config.sync_channel_capacity,
        ));

        if config.auto_sync_enabled {
            sync_manager.start_auto_sync().await;
        }

        let sdk = Arc::new(Self {
            config,
            monitor,
            repository,
            sync_manager,
        });

        info!(
            "✅ TaskSync SDK 初始化完成: version={} data_dir={}",
            SDK_VERSION,
            sdk.config.data_dir.display()
        );

        Ok(sdk)
    }

    /// 以内置网关与静态探测器初始化（演示与测试用）
    pub async fn initialize_with_defaults(config: TaskSyncConfig) -> Result<Arc<Self>> {
        Self::initialize(
            config,
            Arc::new(InMemoryTaskGateway::seeded()),
            Arc::new(StaticConnectivityProbe::new()),
        )
        .await
    }

    /// 切换任务完成状态（在线直接应用，否则合并入队）
    pub async fn toggle_completion(&self, target_id: &str, is_completed: bool) -> Result<QueueOutcome> {
        self.repository.toggle_completion(target_id, is_completed).await
    }

    /// 编辑任务标题与详情（在线直接应用，否则合并入队）
    pub async fn edit_task(&self, target_id: &str, title: &str, details: &str) -> Result<QueueOutcome> {
        self.repository.edit_task(target_id, title, details).await
    }

    /// 拉取远端权威任务快照；离线或失败时返回空列表
    pub async fn fetch_remote_snapshot(&self) -> Result<Vec<Task>> {
        self.repository.fetch_remote_snapshot().await
    }

    /// 手动触发一轮同步（与自动同步共用同一并发闸）
    pub async fn run_sync(&self) -> Result<SyncOutcome> {
        self.sync_manager.run_sync().await
    }

    /// 当前待同步条目数
    pub async fn pending_count(&self) -> Result<usize> {
        self.repository.pending_count().await
    }

    /// 显式清空待同步队列
    pub async fn clear_pending(&self) -> Result<()> {
        self.repository.clear_pending().await
    }

    /// 当前是否在线
    pub async fn is_online(&self) -> bool {
        self.monitor.is_online().await
    }

    /// 当前是否正在同步
    pub fn is_syncing(&self) -> bool {
        self.sync_manager.is_syncing()
    }

    /// 订阅每轮同步的结果
    pub fn subscribe_sync_outcomes(&self) -> broadcast::Receiver<SyncOutcome> {
        self.sync_manager.subscribe_outcomes()
    }

    /// 订阅网络状态变化事件
    pub fn subscribe_network_events(&self) -> broadcast::Receiver<NetworkStatusEvent> {
        self.monitor.subscribe()
    }

    /// 启动自动同步（幂等）
    pub async fn start_auto_sync(&self) {
        self.sync_manager.start_auto_sync().await;
    }

    /// 停止自动同步
    pub async fn stop_auto_sync(&self) {
        self.sync_manager.stop_auto_sync().await;
    }

    /// 关闭 SDK：停止自动同步与网络监控
    ///
    /// 队列数据已随每次写入落盘，关闭时无需额外刷写。
    pub async fn shutdown(&self) {
        self.sync_manager.stop_auto_sync().await;
        self.monitor.stop().await;
        info!("TaskSync SDK 已关闭");
    }

    /// 当前配置
    pub fn config(&self) -> &TaskSyncConfig {
        &self.config
    }
}
