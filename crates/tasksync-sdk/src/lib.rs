//! TaskSync SDK - 离线优先的任务变更队列与同步引擎
//!
//! 本 SDK 提供移动端任务应用的核心同步子系统，包括：
//! - 📦 可持久化的变更队列（SQLite 结构化后端 + sled KV 后备后端）
//! - 🔀 合并入队：同一 (任务, 变更类型) 至多一条排队记录，后写覆盖先写
//! - 📡 网络状态监控与「恢复在线即同步」自动触发
//! - 🔁 按创建顺序重放、首错即停的前缀提交策略（至少一次、保序）
//! - 🧵 单飞同步闸：同一队列上至多一个并发重放
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use tasksync_sdk::{TaskSyncSDK, TaskSyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TaskSyncConfig::builder()
//!         .data_dir("/path/to/data")
//!         .build();
//!
//!     let sdk = TaskSyncSDK::initialize_with_defaults(config).await?;
//!
//!     // 在线直接应用，离线合并入队
//!     let outcome = sdk.toggle_completion("task-1001", true).await?;
//!     println!("queued={} pending={}", outcome.did_queue, outcome.pending_count);
//!
//!     // 手动触发一轮同步
//!     let result = sdk.run_sync().await?;
//!     println!("synced={} pending={}", result.synced_count, result.pending_count);
//!
//!     sdk.shutdown().await;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod error;
pub mod version;
pub mod network;
pub mod gateway;
pub mod storage;
pub mod repository;
pub mod sync;
pub mod sdk;

// 重新导出核心类型，方便使用
pub use error::{Result, TaskSyncSDKError};
pub use gateway::{InMemoryTaskGateway, TaskGateway};
pub use network::{
    ConnectivityProbe, LinkSnapshot, NetworkMonitor, NetworkStatusEvent, StaticConnectivityProbe,
};
pub use repository::{QueueOutcome, SyncOutcome, TaskRepository};
pub use sdk::{TaskSyncConfig, TaskSyncConfigBuilder, TaskSyncSDK};
pub use storage::{MutationKind, PendingMutation, QueueBackend, QueueStore, Task};
pub use sync::SyncManager;
pub use version::SDK_VERSION;
