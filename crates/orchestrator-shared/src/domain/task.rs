//! The `Task` record and its lifecycle status.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle label for a [`Task`].
///
/// Serializes as the lowercase string shown in each variant below. Unknown
/// fields elsewhere on `Task` are ignored on read (see `Task`'s doc comment)
/// but an unrecognized status string is a hard deserialization error — a
/// status the reader doesn't understand is not safe to treat as any
/// particular lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Starting,
    Cloning,
    Running,
    WaitingUser,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// `completed`, `failed`, and `cancelled` are absorbing: a task in one of
    /// these states never transitions again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Localized label used by the progress notifier, keyed by this status.
    pub fn progress_label(self) -> &'static str {
        match self {
            TaskStatus::Pending => "待機中...",
            TaskStatus::Starting => "起動中...",
            TaskStatus::Cloning => "クローン中...",
            TaskStatus::Running => "実行中...",
            TaskStatus::WaitingUser => "ユーザー回答待ち...",
            TaskStatus::Completed => "完了",
            TaskStatus::Failed => "エラー",
            TaskStatus::Cancelled => "キャンセル",
        }
    }
}

/// One user work item tracked by the orchestrator.
///
/// Persisted as a stable, forward-compatible JSON object under `task:{id}`
/// in the keyed store: unknown fields on read are ignored, so a writer can
/// add a field without breaking a reader mid-rollout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub channel: String,
    pub thread: String,
    pub user: String,
    pub prompt: String,
    pub repository_url: String,
    pub status: TaskStatus,
    /// Epoch seconds.
    pub created_at: f64,
    pub idempotency_key: String,
}

impl Task {
    /// The key-value store key this task's serialized record lives under.
    pub fn storage_key(id: Uuid) -> String {
        format!("task:{id}")
    }

    /// The key-value store key an idempotency key maps to a task id under.
    pub fn idempotency_key_storage_key(idempotency_key: &str) -> String {
        format!("idempotency:{idempotency_key}")
    }

    /// The pub/sub channel carrying progress updates for this task.
    pub fn progress_channel(id: Uuid) -> String {
        format!("progress:{id}")
    }

    /// The pub/sub channel carrying sandbox-originated questions for this task.
    pub fn question_channel(id: Uuid) -> String {
        format!("question:{id}")
    }

    /// The pub/sub channel carrying the user's answer back to the sandbox.
    pub fn answer_channel(id: Uuid) -> String {
        format!("answer:{id}")
    }

    /// The pub/sub channel carrying the sandbox's final result artifact,
    /// the wire counterpart of [`super::MessageKind::Result`].
    pub fn result_channel(id: Uuid) -> String {
        format!("result:{id}")
    }

    /// First 8 characters of the task id's canonical dashed form, used to
    /// derive the sandbox container group name.
    pub fn short_id(&self) -> String {
        let rendered = self.id.to_string();
        rendered.chars().take(8).collect()
    }
}
