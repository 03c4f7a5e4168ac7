//! 数据模型 - 任务与待同步变更记录
//!
//! 本模块提供：
//! - `Task`：远端权威任务快照（读侧模型）
//! - `MutationKind`：变更类型的封闭枚举
//! - `PendingMutation`：离线排队的变更意图（队列的基本单元）

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 任务快照（远端为权威数据源，本地只做展示副本）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// 任务ID
    pub task_id: String,
    /// 标题
    pub title: String,
    /// 详情
    pub details: String,
    /// 是否已完成
    pub is_completed: bool,
    /// 最后更新时间（UTC毫秒时间戳）
    pub updated_at: i64,
}

/// 变更类型
///
/// 封闭集合：新增类型必须同时补充对应的重放逻辑，否则不得扩展。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    /// 切换任务完成状态
    #[serde(rename = "TOGGLE_COMPLETION")]
    ToggleCompletion,
    /// 编辑任务标题与详情
    #[serde(rename = "EDIT_FIELDS")]
    EditFields,
}

impl MutationKind {
    /// 持久化用的稳定字符串编码
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::ToggleCompletion => "TOGGLE_COMPLETION",
            MutationKind::EditFields => "EDIT_FIELDS",
        }
    }

    /// 从持久化编码解析；未知编码返回 None（由调用方静默丢弃）
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TOGGLE_COMPLETION" => Some(MutationKind::ToggleCompletion),
            "EDIT_FIELDS" => Some(MutationKind::EditFields),
            _ => None,
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 待同步变更记录 - 队列的基本单元
///
/// 不变量：
/// - 同一 (`target_id`, `kind`) 在队列中最多存在一条（由合并入队保证）
/// - 每种 kind 恰好填充一种载荷：ToggleCompletion 用 `is_completed`，
///   EditFields 用 `title` + `details`
/// - 记录只会被整条替换（合并）或删除，绝不原地部分更新
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    /// 队列条目的稳定唯一标识（入队时分配；合并时可复用旧条目的 id）
    pub queue_id: String,
    /// 变更类型
    pub kind: MutationKind,
    /// 目标任务ID
    pub target_id: String,
    /// 标题（仅 EditFields）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 详情（仅 EditFields）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// 完成状态（仅 ToggleCompletion）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    /// 创建时间（UTC毫秒时间戳），只用于排序
    pub created_at: i64,
}

impl PendingMutation {
    /// 创建切换完成状态的变更
    pub fn toggle(target_id: &str, is_completed: bool) -> Self {
        Self {
            queue_id: new_queue_id(),
            kind: MutationKind::ToggleCompletion,
            target_id: target_id.to_string(),
            title: None,
            details: None,
            is_completed: Some(is_completed),
            created_at: now_ms(),
        }
    }

    /// 创建编辑标题与详情的变更
    pub fn edit(target_id: &str, title: &str, details: &str) -> Self {
        Self {
            queue_id: new_queue_id(),
            kind: MutationKind::EditFields,
            target_id: target_id.to_string(),
            title: Some(title.to_string()),
            details: Some(details.to_string()),
            is_completed: None,
            created_at: now_ms(),
        }
    }

    /// 校验并还原一条持久化记录
    ///
    /// 仅要求必填字段（queue_id / kind / target_id / created_at）形状正确，
    /// 未知的附加字段一律容忍（schema 只做增量演进）。
    /// 形状不对的记录返回 None，由读取方静默丢弃，绝不让单条坏记录毁掉整个队列。
    pub fn sanitize(value: &serde_json::Value) -> Option<PendingMutation> {
        let raw = value.as_object()?;

        let queue_id = raw.get("queue_id")?.as_str()?;
        let kind = MutationKind::parse(raw.get("kind")?.as_str()?)?;
        let target_id = raw.get("target_id")?.as_str()?;
        let created_at = raw.get("created_at")?.as_i64()?;

        Some(PendingMutation {
            queue_id: queue_id.to_string(),
            kind,
            target_id: target_id.to_string(),
            title: raw.get("title").and_then(|v| v.as_str()).map(str::to_string),
            details: raw.get("details").and_then(|v| v.as_str()).map(str::to_string),
            is_completed: raw.get("is_completed").and_then(|v| v.as_bool()),
            created_at,
        })
    }
}

/// 生成新的队列条目ID
fn new_queue_id() -> String {
    format!("queue-{}", Uuid::new_v4())
}

/// 当前 UTC 毫秒时间戳
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_shape_per_kind() {
        let toggle = PendingMutation::toggle("task-1", true);
        assert_eq!(toggle.kind, MutationKind::ToggleCompletion);
        assert_eq!(toggle.is_completed, Some(true));
        assert!(toggle.title.is_none() && toggle.details.is_none());

        let edit = PendingMutation::edit("task-1", "标题", "详情");
        assert_eq!(edit.kind, MutationKind::EditFields);
        assert_eq!(edit.title.as_deref(), Some("标题"));
        assert_eq!(edit.details.as_deref(), Some("详情"));
        assert!(edit.is_completed.is_none());

        // 两条记录的 queue_id 必须互不相同
        assert_ne!(toggle.queue_id, edit.queue_id);
    }

    #[test]
    fn test_kind_encoding_roundtrip() {
        assert_eq!(
            MutationKind::parse(MutationKind::ToggleCompletion.as_str()),
            Some(MutationKind::ToggleCompletion)
        );
        assert_eq!(
            MutationKind::parse(MutationKind::EditFields.as_str()),
            Some(MutationKind::EditFields)
        );
        assert_eq!(MutationKind::parse("DELETE_TASK"), None);
    }

    #[test]
    fn test_sanitize_accepts_valid_record() {
        let value = json!({
            "queue_id": "queue-1",
            "kind": "EDIT_FIELDS",
            "target_id": "task-1",
            "title": "A",
            "details": "B",
            "created_at": 1000,
            "future_field": "ignored"
        });

        let mutation = PendingMutation::sanitize(&value).unwrap();
        assert_eq!(mutation.queue_id, "queue-1");
        assert_eq!(mutation.kind, MutationKind::EditFields);
        assert_eq!(mutation.title.as_deref(), Some("A"));
        assert_eq!(mutation.created_at, 1000);
    }

    #[test]
    fn test_sanitize_drops_malformed_records() {
        // 缺少必填字段
        assert!(PendingMutation::sanitize(&json!({ "queue_id": "q" })).is_none());
        // kind 未知
        assert!(PendingMutation::sanitize(&json!({
            "queue_id": "q", "kind": "UNKNOWN", "target_id": "t", "created_at": 1
        }))
        .is_none());
        // created_at 类型错误
        assert!(PendingMutation::sanitize(&json!({
            "queue_id": "q", "kind": "EDIT_FIELDS", "target_id": "t", "created_at": "soon"
        }))
        .is_none());
        // 根本不是对象
        assert!(PendingMutation::sanitize(&json!("not-an-object")).is_none());
    }

    #[test]
    fn test_serde_roundtrip() {
        let mutation = PendingMutation::edit("task-9", "T", "D");
        let encoded = serde_json::to_value(&mutation).unwrap();
        let decoded = PendingMutation::sanitize(&encoded).unwrap();
        assert_eq!(decoded, mutation);
    }
}
