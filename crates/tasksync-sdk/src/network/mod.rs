//! 网络状态监控
//!
//! 本模块提供：
//! - `LinkSnapshot`：底层链路状态的瞬时快照
//! - `ConnectivityProbe` trait：由平台层实现（如 Android/iOS）
//! - `NetworkMonitor`：统一的在线判定与状态变化广播
//!
//! 在线判定：链路已连接 **且** 可达性未被显式判定为不可达。
//! 可达性未知时按在线处理（乐观默认），否则误判离线会把本可直接
//! 成功的操作白白压进队列。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::error::Result;

/// 链路状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    /// 底层连接是否存在
    pub is_connected: bool,
    /// 互联网可达性；None 表示未知
    pub internet_reachable: Option<bool>,
}

impl LinkSnapshot {
    /// 全在线快照
    pub fn online() -> Self {
        Self {
            is_connected: true,
            internet_reachable: Some(true),
        }
    }

    /// 完全离线快照
    pub fn offline() -> Self {
        Self {
            is_connected: false,
            internet_reachable: Some(false),
        }
    }

    /// 在线判定：已连接且可达性不为显式 false
    pub fn is_online(&self) -> bool {
        self.is_connected && self.internet_reachable != Some(false)
    }
}

/// 网络状态变化事件
#[derive(Debug, Clone)]
pub struct NetworkStatusEvent {
    pub was_online: bool,
    pub is_online: bool,
    /// UTC毫秒时间戳
    pub timestamp: i64,
}

impl NetworkStatusEvent {
    /// 是否为「转为在线」的跃迁（自动同步的触发条件）
    pub fn became_online(&self) -> bool {
        self.is_online && !self.was_online
    }
}

/// 连接状态探测器 trait（由平台层实现）
#[async_trait]
pub trait ConnectivityProbe: Send + Sync + std::fmt::Debug {
    /// 获取当前链路快照（即时查询）
    async fn current(&self) -> LinkSnapshot;

    /// 开始监听链路变化
    async fn start_monitoring(&self) -> Result<broadcast::Receiver<LinkSnapshot>>;

    /// 停止监听
    async fn stop_monitoring(&self);
}

/// 网络监控管理器
#[derive(Debug)]
pub struct NetworkMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    event_sender: broadcast::Sender<NetworkStatusEvent>,
    last_online: Arc<RwLock<bool>>,
    forward_task: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkMonitor {
    pub fn new(probe: Arc<dyn ConnectivityProbe>) -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            probe,
            event_sender,
            last_online: Arc::new(RwLock::new(false)),
            forward_task: Mutex::new(None),
        }
    }

    /// 启动监控：把探测器的快照流转换为在线/离线跃迁事件
    ///
    /// 重复调用无操作。
    pub async fn start(&self) -> Result<()> {
        let mut task_guard = self.forward_task.lock().await;
        if task_guard.is_some() {
            return Ok(());
        }

        // 以当前快照初始化在线状态，避免首个事件被误判为跃迁
        {
            let mut last_online = self.last_online.write().await;
            *last_online = self.probe.current().await.is_online();
        }

        let mut receiver = self.probe.start_monitoring().await?;
        let event_sender = self.event_sender.clone();
        let last_online = self.last_online.clone();

        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(snapshot) => {
                        let is_online = snapshot.is_online();
                        let was_online = {
                            let mut last = last_online.write().await;
                            let was = *last;
                            *last = is_online;
                            was
                        };

                        let event = NetworkStatusEvent {
                            was_online,
                            is_online,
                            timestamp: chrono::Utc::now().timestamp_millis(),
                        };
                        let _ = event_sender.send(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        *task_guard = Some(handle);
        Ok(())
    }

    /// 停止监控；未启动时调用同样安全
    pub async fn stop(&self) {
        if let Some(handle) = self.forward_task.lock().await.take() {
            handle.abort();
        }
        self.probe.stop_monitoring().await;
    }

    /// 即时在线判定（直接查询探测器）
    pub async fn is_online(&self) -> bool {
        self.probe.current().await.is_online()
    }

    /// 订阅网络状态变化事件
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkStatusEvent> {
        self.event_sender.subscribe()
    }
}

/// 进程内静态探测器（默认实现，假设网络在线，可手动翻转）
///
/// 实际应用应由平台层提供真实探测器；本实现同时用于测试。
#[derive(Debug)]
pub struct StaticConnectivityProbe {
    snapshot: Arc<RwLock<LinkSnapshot>>,
    sender: broadcast::Sender<LinkSnapshot>,
}

impl Default for StaticConnectivityProbe {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self {
            // 可达性默认未知，按在线处理
            snapshot: Arc::new(RwLock::new(LinkSnapshot {
                is_connected: true,
                internet_reachable: None,
            })),
            sender,
        }
    }
}

impl StaticConnectivityProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以离线状态创建
    pub fn offline() -> Self {
        let probe = Self::default();
        let snapshot = probe.snapshot.clone();
        // Default 刚创建，无订阅者，直接覆写即可
        if let Ok(mut guard) = snapshot.try_write() {
            *guard = LinkSnapshot::offline();
        }
        probe
    }

    /// 更新快照并广播给所有订阅者
    pub async fn set_snapshot(&self, snapshot: LinkSnapshot) {
        {
            let mut guard = self.snapshot.write().await;
            *guard = snapshot;
        }
        let _ = self.sender.send(snapshot);
    }

    /// 切换底层连接状态
    pub async fn set_connected(&self, is_connected: bool) {
        let current = *self.snapshot.read().await;
        self.set_snapshot(LinkSnapshot {
            is_connected,
            ..current
        })
        .await;
    }

    /// 更新互联网可达性判定
    pub async fn set_reachable(&self, internet_reachable: Option<bool>) {
        let current = *self.snapshot.read().await;
        self.set_snapshot(LinkSnapshot {
            internet_reachable,
            ..current
        })
        .await;
    }
}

#[async_trait]
impl ConnectivityProbe for StaticConnectivityProbe {
    async fn current(&self) -> LinkSnapshot {
        *self.snapshot.read().await
    }

    async fn start_monitoring(&self) -> Result<broadcast::Receiver<LinkSnapshot>> {
        Ok(self.sender.subscribe())
    }

    async fn stop_monitoring(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_resolution() {
        // 已连接 + 可达 → 在线
        assert!(LinkSnapshot { is_connected: true, internet_reachable: Some(true) }.is_online());
        // 已连接 + 可达性未知 → 按在线处理（乐观默认）
        assert!(LinkSnapshot { is_connected: true, internet_reachable: None }.is_online());
        // 已连接 + 显式不可达 → 离线
        assert!(!LinkSnapshot { is_connected: true, internet_reachable: Some(false) }.is_online());
        // 未连接 → 离线，可达性无关
        assert!(!LinkSnapshot { is_connected: false, internet_reachable: Some(true) }.is_online());
    }

    #[tokio::test]
    async fn test_monitor_emits_transition_events() {
        let probe = Arc::new(StaticConnectivityProbe::offline());
        let monitor = NetworkMonitor::new(probe.clone());
        monitor.start().await.unwrap();
        assert!(!monitor.is_online().await);

        let mut events = monitor.subscribe();
        probe.set_snapshot(LinkSnapshot::online()).await;

        let event = events.recv().await.unwrap();
        assert!(event.became_online());
        assert!(monitor.is_online().await);

        // 再转回离线：is_online=false，不是「转为在线」跃迁
        probe.set_snapshot(LinkSnapshot::offline()).await;
        let event = events.recv().await.unwrap();
        assert!(!event.is_online);
        assert!(!event.became_online());

        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_monitor_start_is_idempotent() {
        let probe = Arc::new(StaticConnectivityProbe::new());
        let monitor = NetworkMonitor::new(probe.clone());
        monitor.start().await.unwrap();
        monitor.start().await.unwrap();

        let mut events = monitor.subscribe();
        probe.set_snapshot(LinkSnapshot::offline()).await;

        // 只会收到一份事件，不因重复 start 而翻倍
        let first = events.recv().await.unwrap();
        assert!(!first.is_online);
        assert!(matches!(
            tokio::time::timeout(std::time::Duration::from_millis(50), events.recv()).await,
            Err(_)
        ));

        // stop 可重复调用
        monitor.stop().await;
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_online_to_online_is_not_a_transition() {
        let probe = Arc::new(StaticConnectivityProbe::new());
        let monitor = NetworkMonitor::new(probe.clone());
        monitor.start().await.unwrap();

        let mut events = monitor.subscribe();
        // 已在线时把可达性从未知改为 true，仍在线
        probe.set_reachable(Some(true)).await;

        let event = events.recv().await.unwrap();
        assert!(event.is_online);
        assert!(!event.became_online());

        monitor.stop().await;
    }
}
