use std::sync::Arc;
use std::time::Duration;

use tasksync_sdk::{
    InMemoryTaskGateway, LinkSnapshot, StaticConnectivityProbe, TaskSyncConfig, TaskSyncSDK,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("🚀 TaskSync SDK 离线队列演示");
    println!("==============================\n");

    // 示例1：以离线状态初始化 SDK
    println!("📋 示例1: 初始化（初始离线）");

    let data_dir = tempfile::TempDir::new()?;
    let config = TaskSyncConfig::builder()
        .data_dir(data_dir.path())
        .auto_sync_enabled(true)
        .build();

    let probe = Arc::new(StaticConnectivityProbe::offline());
    let gateway = Arc::new(InMemoryTaskGateway::seeded());
    let sdk = TaskSyncSDK::initialize(config, gateway, probe.clone()).await?;

    println!("✅ SDK 初始化成功, 在线状态: {}\n", sdk.is_online().await);

    // 示例2：离线变更合并入队
    println!("📦 示例2: 离线变更（同一任务重复编辑会合并）");

    sdk.edit_task("task-1001", "初版标题", "初版详情").await?;
    let outcome = sdk.edit_task("task-1001", "终版标题", "终版详情").await?;
    println!(
        "  编辑 task-1001 两次 -> queued={} pending={}",
        outcome.did_queue, outcome.pending_count
    );

    let outcome = sdk.toggle_completion("task-1002", false).await?;
    println!(
        "  切换 task-1002 完成态 -> queued={} pending={}\n",
        outcome.did_queue, outcome.pending_count
    );

    // 示例3：网络恢复触发自动同步
    println!("📡 示例3: 网络恢复 -> 自动重放队列");

    let mut outcomes = sdk.subscribe_sync_outcomes();
    probe.set_snapshot(LinkSnapshot::online()).await;

    let outcome = tokio::time::timeout(Duration::from_secs(2), outcomes.recv()).await??;
    println!(
        "✅ 自动同步完成: synced={} pending={}\n",
        outcome.synced_count, outcome.pending_count
    );

    // 示例4：拉取远端权威快照
    println!("🔄 示例4: 拉取远端快照");
    for task in sdk.fetch_remote_snapshot().await? {
        println!(
            "  [{}] {} (完成: {})",
            task.task_id, task.title, task.is_completed
        );
    }

    sdk.shutdown().await;
    println!("\n👋 演示结束");
    Ok(())
}
