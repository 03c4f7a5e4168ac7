//! 任务仓储层 - 变更队列的唯一入口
//!
//! 写路径策略：在线时先直接尝试远端调用（在线常态路径不产生队列搅动），
//! 失败或离线才合并入队；同一 (target, kind) 的新变更**取代**旧条目
//! 而不是追加，防止离线反复切换/编辑造成队列无限增长。
//!
//! 队列存储由本仓储独占持有，合并入队与重放删除都是
//! 读-改-写序列，统一经由内部互斥锁串行化。
//! 瞬时远端失败从不上抛：调用方只会看到 queued/synced/pending 的普通数据。

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::gateway::TaskGateway;
use crate::network::NetworkMonitor;
use crate::storage::entities::{MutationKind, PendingMutation, Task};
use crate::storage::{QueueBackend, QueueStore};

/// 排队操作的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOutcome {
    /// 本次操作是否进入了队列（false 表示已直接应用到远端）
    pub did_queue: bool,
    /// 操作后的待同步总数
    pub pending_count: usize,
}

/// 一次同步重放的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// 成功重放并移除的条目数
    pub synced_count: usize,
    /// 重放后仍在排队的条目数
    pub pending_count: usize,
}

/// 任务仓储
#[derive(Debug)]
pub struct TaskRepository {
    store: QueueStore,
    monitor: Arc<NetworkMonitor>,
    gateway: Arc<dyn TaskGateway>,
    /// 串行化所有对队列的读-改-写序列（合并入队 / 重放删除）
    queue_lock: Mutex<()>,
}

impl TaskRepository {
    pub fn new(
        store: QueueStore,
        monitor: Arc<NetworkMonitor>,
        gateway: Arc<dyn TaskGateway>,
    ) -> Self {
        Self {
            store,
            monitor,
            gateway,
            queue_lock: Mutex::new(()),
        }
    }

    /// 切换任务完成状态
    ///
    /// 在线先试远端；远端失败**必须**仍然入队，否则该变更会被静默丢失。
    pub async fn toggle_completion(&self, target_id: &str, is_completed: bool) -> Result<QueueOutcome> {
        let candidate = PendingMutation::toggle(target_id, is_completed);

        if self.monitor.is_online().await {
            match self.gateway.update_completion(target_id, is_completed).await {
                Ok(()) => {
                    return Ok(QueueOutcome {
                        did_queue: false,
                        pending_count: self.store.count().await?,
                    });
                }
                Err(e) => {
                    debug!("在线切换完成状态失败，转入队列: {}", e);
                    // 继续走入队路径
                }
            }
        }

        self.merge_enqueue(candidate).await?;
        Ok(QueueOutcome {
            did_queue: true,
            pending_count: self.store.count().await?,
        })
    }

    /// 编辑任务标题与详情
    pub async fn edit_task(&self, target_id: &str, title: &str, details: &str) -> Result<QueueOutcome> {
        let candidate = PendingMutation::edit(target_id, title, details);

        if self.monitor.is_online().await {
            match self.gateway.edit_task(target_id, title, details).await {
                Ok(()) => {
                    return Ok(QueueOutcome {
                        did_queue: false,
                        pending_count: self.store.count().await?,
                    });
                }
                Err(e) => {
                    debug!("在线编辑任务失败，转入队列: {}", e);
                    // 继续走入队路径
                }
            }
        }

        self.merge_enqueue(candidate).await?;
        Ok(QueueOutcome {
            did_queue: true,
            pending_count: self.store.count().await?,
        })
    }

    /// 拉取远端权威任务快照
    ///
    /// 离线或远端失败一律返回空列表而不是错误；
    /// 调用方据此保留本地展示副本即可。
    pub async fn fetch_remote_snapshot(&self) -> Result<Vec<Task>> {
        if !self.monitor.is_online().await {
            return Ok(Vec::new());
        }

        match self.gateway.fetch_tasks().await {
            Ok(tasks) => Ok(tasks),
            Err(e) => {
                debug!("拉取远端任务失败，返回空快照: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// 重放待同步队列
    ///
    /// 按 created_at 升序逐条重放；**首个失败即停**，已成功的前缀
    /// 从队列移除，失败条目及其后全部保留原序等待下次同步。
    /// 载荷缺失的坏条目记日志后直接移除，不重放、不重试。
    pub async fn sync_pending(&self) -> Result<SyncOutcome> {
        if !self.monitor.is_online().await {
            return Ok(SyncOutcome {
                synced_count: 0,
                pending_count: self.store.count().await?,
            });
        }

        let _guard = self.queue_lock.lock().await;

        let pending = self.store.list_all().await?;
        let mut removable: Vec<String> = Vec::new();
        let mut synced_count = 0usize;

        // 坏条目（载荷与 kind 不匹配）只可能来自损坏的持久化数据，永远无法重放；
        // 这里选择删除而不是留在队列里每轮跳过，否则待同步计数会被永久污染。
        for mutation in &pending {
            match mutation.kind {
                MutationKind::ToggleCompletion => {
                    let Some(is_completed) = mutation.is_completed else {
                        warn!("丢弃缺失完成状态载荷的队列条目: {}", mutation.queue_id);
                        removable.push(mutation.queue_id.clone());
                        continue;
                    };
                    match self
                        .gateway
                        .update_completion(&mutation.target_id, is_completed)
                        .await
                    {
                        Ok(()) => {
                            removable.push(mutation.queue_id.clone());
                            synced_count += 1;
                        }
                        Err(e) => {
                            // 保序：停在第一个失败处
                            debug!("重放在 {} 处失败，停止本轮同步: {}", mutation.queue_id, e);
                            break;
                        }
                    }
                }
                MutationKind::EditFields => {
                    let (Some(title), Some(details)) = (&mutation.title, &mutation.details) else {
                        warn!("丢弃缺失编辑载荷的队列条目: {}", mutation.queue_id);
                        removable.push(mutation.queue_id.clone());
                        continue;
                    };
                    match self
                        .gateway
                        .edit_task(&mutation.target_id, title, details)
                        .await
                    {
                        Ok(()) => {
                            removable.push(mutation.queue_id.clone());
                            synced_count += 1;
                        }
                        Err(e) => {
                            // 保序：停在第一个失败处
                            debug!("重放在 {} 处失败，停止本轮同步: {}", mutation.queue_id, e);
                            break;
                        }
                    }
                }
            }
        }

        self.store.remove_by_ids(&removable).await?;

        Ok(SyncOutcome {
            synced_count,
            pending_count: self.store.count().await?,
        })
    }

    /// 当前待同步条目数
    pub async fn pending_count(&self) -> Result<usize> {
        self.store.count().await
    }

    /// 显式清空待同步队列
    pub async fn clear_pending(&self) -> Result<()> {
        let _guard = self.queue_lock.lock().await;
        self.store.clear().await
    }

    /// 合并入队
    ///
    /// 从最近追加的一端反向扫描，找到同 (target, kind) 的旧条目则删除它
    /// 并复用其 queue_id（保留原位置意图、替换内容），保证同 (target, kind)
    /// 至多一条、后来的编辑总是赢。
    async fn merge_enqueue(&self, mut candidate: PendingMutation) -> Result<()> {
        let _guard = self.queue_lock.lock().await;

        let existing = self.store.list_all().await?;
        let superseded = existing
            .iter()
            .rev()
            .find(|m| m.target_id == candidate.target_id && m.kind == candidate.kind);

        if let Some(previous) = superseded {
            self.store.remove_by_ids(&[previous.queue_id.clone()]).await?;
            candidate.queue_id = previous.queue_id.clone();
        }

        self.store.append(&candidate).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskSyncSDKError;
    use crate::network::StaticConnectivityProbe;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// 测试网关：记录调用顺序，可按 target 定点失败
    #[derive(Debug, Default)]
    struct ScriptedGateway {
        calls: StdMutex<Vec<String>>,
        fail_targets: StdMutex<HashSet<String>>,
    }

    impl ScriptedGateway {
        fn fail_on(&self, target_id: &str) {
            self.fail_targets.lock().unwrap().insert(target_id.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn check(&self, target_id: &str) -> Result<()> {
            if self.fail_targets.lock().unwrap().contains(target_id) {
                return Err(TaskSyncSDKError::Transport("模拟网络失败".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TaskGateway for ScriptedGateway {
        async fn fetch_tasks(&self) -> Result<Vec<Task>> {
            Ok(Vec::new())
        }

        async fn update_completion(&self, task_id: &str, is_completed: bool) -> Result<()> {
            self.check(task_id)?;
            self.calls
                .lock()
                .unwrap()
                .push(format!("toggle:{}:{}", task_id, is_completed));
            Ok(())
        }

        async fn edit_task(&self, task_id: &str, title: &str, _details: &str) -> Result<()> {
            self.check(task_id)?;
            self.calls.lock().unwrap().push(format!("edit:{}:{}", task_id, title));
            Ok(())
        }
    }

    struct Fixture {
        _temp_dir: TempDir,
        probe: Arc<StaticConnectivityProbe>,
        gateway: Arc<ScriptedGateway>,
        repository: TaskRepository,
    }

    async fn fixture(online: bool) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store = QueueStore::open(temp_dir.path()).await.unwrap();
        let probe = Arc::new(if online {
            StaticConnectivityProbe::new()
        } else {
            StaticConnectivityProbe::offline()
        });
        let monitor = Arc::new(NetworkMonitor::new(probe.clone()));
        let gateway = Arc::new(ScriptedGateway::default());
        let repository = TaskRepository::new(store, monitor, gateway.clone());
        Fixture {
            _temp_dir: temp_dir,
            probe,
            gateway,
            repository,
        }
    }

    #[tokio::test]
    async fn test_online_success_does_not_queue() {
        let f = fixture(true).await;

        let outcome = f.repository.toggle_completion("t1", true).await.unwrap();
        assert!(!outcome.did_queue);
        assert_eq!(outcome.pending_count, 0);
        assert_eq!(f.gateway.calls(), vec!["toggle:t1:true"]);
        assert_eq!(f.repository.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_online_failure_still_queues() {
        let f = fixture(true).await;
        f.gateway.fail_on("t1");

        let outcome = f.repository.toggle_completion("t1", true).await.unwrap();
        assert!(outcome.did_queue);
        assert_eq!(outcome.pending_count, 1);
    }

    #[tokio::test]
    async fn test_offline_edits_merge_to_single_entry() {
        let f = fixture(false).await;

        f.repository.edit_task("t1", "A", "B").await.unwrap();
        let outcome = f.repository.edit_task("t1", "C", "D").await.unwrap();

        assert!(outcome.did_queue);
        assert_eq!(outcome.pending_count, 1);

        let queue = f.repository.store.list_all().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].kind, MutationKind::EditFields);
        assert_eq!(queue[0].title.as_deref(), Some("C"));
        assert_eq!(queue[0].details.as_deref(), Some("D"));
    }

    #[tokio::test]
    async fn test_merge_reuses_queue_id_and_is_per_kind() {
        let f = fixture(false).await;

        f.repository.toggle_completion("t1", true).await.unwrap();
        let first_id = f.repository.store.list_all().await.unwrap()[0].queue_id.clone();

        // 同 target 不同 kind 不合并
        f.repository.edit_task("t1", "A", "B").await.unwrap();
        assert_eq!(f.repository.pending_count().await.unwrap(), 2);

        // 同 target 同 kind 合并且复用 queue_id
        f.repository.toggle_completion("t1", false).await.unwrap();
        let queue = f.repository.store.list_all().await.unwrap();
        assert_eq!(queue.len(), 2);

        let toggle = queue
            .iter()
            .find(|m| m.kind == MutationKind::ToggleCompletion)
            .unwrap();
        assert_eq!(toggle.queue_id, first_id);
        assert_eq!(toggle.is_completed, Some(false));

        // 不同 target 永不合并
        f.repository.toggle_completion("t2", true).await.unwrap();
        assert_eq!(f.repository.pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_fetch_snapshot_offline_returns_empty() {
        let f = fixture(false).await;
        assert!(f.repository.fetch_remote_snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_replays_in_creation_order() {
        let f = fixture(false).await;

        f.repository.toggle_completion("t1", true).await.unwrap();
        f.repository.edit_task("t2", "T", "D").await.unwrap();
        f.repository.toggle_completion("t3", false).await.unwrap();

        f.probe.set_snapshot(crate::network::LinkSnapshot::online()).await;
        let outcome = f.repository.sync_pending().await.unwrap();

        assert_eq!(outcome.synced_count, 3);
        assert_eq!(outcome.pending_count, 0);
        assert_eq!(
            f.gateway.calls(),
            vec!["toggle:t1:true", "edit:t2:T", "toggle:t3:false"]
        );
    }

    #[tokio::test]
    async fn test_sync_stops_at_first_failure_keeping_suffix() {
        let f = fixture(false).await;

        f.repository.toggle_completion("t1", true).await.unwrap();
        f.repository.toggle_completion("t2", true).await.unwrap();
        f.repository.toggle_completion("t3", true).await.unwrap();

        f.gateway.fail_on("t2");
        f.probe.set_snapshot(crate::network::LinkSnapshot::online()).await;

        let outcome = f.repository.sync_pending().await.unwrap();
        assert_eq!(outcome.synced_count, 1);
        assert_eq!(outcome.pending_count, 2);

        // 失败条目及其后保留原序
        let queue = f.repository.store.list_all().await.unwrap();
        let targets: Vec<&str> = queue.iter().map(|m| m.target_id.as_str()).collect();
        assert_eq!(targets, vec!["t2", "t3"]);

        // 失败恢复后下次同步续上
        f.gateway.fail_targets.lock().unwrap().clear();
        let outcome = f.repository.sync_pending().await.unwrap();
        assert_eq!(outcome.synced_count, 2);
        assert_eq!(outcome.pending_count, 0);
    }

    #[tokio::test]
    async fn test_sync_offline_is_a_noop() {
        let f = fixture(false).await;
        f.repository.toggle_completion("t1", true).await.unwrap();

        let outcome = f.repository.sync_pending().await.unwrap();
        assert_eq!(outcome.synced_count, 0);
        assert_eq!(outcome.pending_count, 1);
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sync_drops_malformed_entries_without_replaying() {
        let temp_dir = TempDir::new().unwrap();
        let store = QueueStore::open(temp_dir.path()).await.unwrap();

        // 直接在存储层放入缺失载荷的坏条目（只可能来自损坏的持久化数据）
        let mut malformed = PendingMutation::edit("t1", "A", "B");
        malformed.details = None;
        malformed.created_at = 1;
        store.append(&malformed).await.unwrap();

        let mut good = PendingMutation::toggle("t2", true);
        good.created_at = 2;
        store.append(&good).await.unwrap();

        let probe = Arc::new(StaticConnectivityProbe::new());
        let monitor = Arc::new(NetworkMonitor::new(probe));
        let gateway = Arc::new(ScriptedGateway::default());
        let repository = TaskRepository::new(store, monitor, gateway.clone());

        let outcome = repository.sync_pending().await.unwrap();
        // 坏条目被移除但不计入 synced
        assert_eq!(outcome.synced_count, 1);
        assert_eq!(outcome.pending_count, 0);
        assert_eq!(gateway.calls(), vec!["toggle:t2:true"]);
    }

    #[tokio::test]
    async fn test_clear_pending_empties_queue() {
        let f = fixture(false).await;
        f.repository.edit_task("t1", "A", "B").await.unwrap();
        f.repository.clear_pending().await.unwrap();
        assert_eq!(f.repository.pending_count().await.unwrap(), 0);
    }
}
