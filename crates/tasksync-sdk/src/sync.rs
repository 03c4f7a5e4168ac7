//! 同步管理器 - 队列重放的唯一调度点
//!
//! 状态机只有一个布尔：idle / syncing。
//! - `run_sync()` 在 idle 时进入 syncing，重放结束无条件回到 idle；
//! - syncing 期间再次调用是无操作，立即返回当前待同步数与 0 同步数。
//!
//! 这保证同一队列上**至多一个**并发重放（手动下拉刷新与网络恢复
//! 触发的自动同步相互竞争时，远端不会被重复调用）。
//!
//! 自动同步：订阅网络监控，任何「转为在线」的跃迁都会触发一次
//! `run_sync()`，复用同一并发闸。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::network::NetworkMonitor;
use crate::repository::{SyncOutcome, TaskRepository};

/// 并发闸守卫：离开作用域（包括重放中途 panic 展开）时无条件回到 idle
struct SyncGate<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SyncGate<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// 同步管理器
#[derive(Debug)]
pub struct SyncManager {
    repository: Arc<TaskRepository>,
    monitor: Arc<NetworkMonitor>,
    /// 并发闸：true 表示正在同步
    sync_in_progress: AtomicBool,
    /// 每轮完成的结果广播（UI 状态层订阅用）
    outcome_sender: broadcast::Sender<SyncOutcome>,
    auto_sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncManager {
    pub fn new(
        repository: Arc<TaskRepository>,
        monitor: Arc<NetworkMonitor>,
        outcome_channel_capacity: usize,
    ) -> Self {
        let (outcome_sender, _) = broadcast::channel(outcome_channel_capacity.max(1));
        Self {
            repository,
            monitor,
            sync_in_progress: AtomicBool::new(false),
            outcome_sender,
            auto_sync_task: Mutex::new(None),
        }
    }

    /// 执行一轮同步
    ///
    /// 已有重放在跑时立即返回（0 同步数 + 当前待同步数），不排队等待。
    pub async fn run_sync(&self) -> Result<SyncOutcome> {
        if self
            .sync_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("已有同步在执行，跳过本次触发");
            return Ok(SyncOutcome {
                synced_count: 0,
                pending_count: self.repository.pending_count().await?,
            });
        }

        let gate = SyncGate {
            flag: &self.sync_in_progress,
        };
        let result = self.repository.sync_pending().await;
        // 无论成败（含展开）都必须回到 idle
        drop(gate);

        if let Ok(outcome) = &result {
            if outcome.synced_count > 0 {
                info!(
                    "✅ 同步完成: synced={} pending={}",
                    outcome.synced_count, outcome.pending_count
                );
            }
            let _ = self.outcome_sender.send(*outcome);
        }

        result
    }

    /// 当前是否正在同步
    pub fn is_syncing(&self) -> bool {
        self.sync_in_progress.load(Ordering::SeqCst)
    }

    /// 订阅每轮同步的结果
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<SyncOutcome> {
        self.outcome_sender.subscribe()
    }

    /// 启动自动同步：网络转为在线即触发一轮重放
    ///
    /// 幂等：已启动时再次调用无操作。
    pub async fn start_auto_sync(self: &Arc<Self>) {
        let mut task_guard = self.auto_sync_task.lock().await;
        if task_guard.is_some() {
            return;
        }

        let mut events = self.monitor.subscribe();
        let manager = Arc::clone(self);

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if !event.became_online() {
                            continue;
                        }
                        debug!("网络恢复，触发自动同步");
                        if let Err(e) = manager.run_sync().await {
                            warn!("自动同步失败: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        *task_guard = Some(handle);
    }

    /// 停止自动同步；未启动时调用同样安全
    pub async fn stop_auto_sync(&self) {
        if let Some(handle) = self.auto_sync_task.lock().await.take() {
            handle.abort();
        }
    }
}
