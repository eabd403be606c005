//! Publishes task progress on the shared pub/sub channel and, on the
//! receive side, edits a registered chat message as updates arrive.

use std::collections::HashMap;
use std::sync::Mutex;

use orchestrator_shared::domain::{ProgressPayload, Task, TaskStatus};
use orchestrator_shared::messaging::PubSubClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::client::ChatClient;
use crate::error::ChatResult;

fn progress_label(status: &str) -> &str {
    match status {
        "pending" => "待機中...",
        "starting" => "起動中...",
        "cloning" => "クローン中...",
        "running" => "実行中...",
        "waiting_user" => "ユーザー回答待ち...",
        "completed" => "完了",
        "failed" => "エラー",
        "cancelled" => "キャンセル",
        other => other,
    }
}

fn format_progress_message(status: &str, step: u64, total: u64) -> String {
    format!("{} ({}/{})", progress_label(status), step, total)
}

#[derive(Debug, Clone)]
struct RegisteredMessage {
    channel: String,
    message_ts: String,
}

/// Publishes progress events and, for any task that has had a message
/// registered, edits that message in place as events arrive.
pub struct ProgressNotifier<C: ChatClient> {
    pubsub: PubSubClient,
    chat: C,
    registry: Mutex<HashMap<Uuid, RegisteredMessage>>,
}

impl<C: ChatClient> std::fmt::Debug for ProgressNotifier<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressNotifier").finish_non_exhaustive()
    }
}

impl<C: ChatClient> ProgressNotifier<C> {
    pub fn new(pubsub: PubSubClient, chat: C) -> Self {
        Self {
            pubsub,
            chat,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Records where `start_listening` should edit progress updates for
    /// `task_id`. Safe to call before or after `start_listening` is
    /// spawned; a progress event that arrives with nothing registered is
    /// simply dropped, since a later event will still carry current status.
    pub fn register_message(&self, task_id: Uuid, channel: impl Into<String>, message_ts: impl Into<String>) {
        self.registry.lock().expect("mutex poisoned").insert(
            task_id,
            RegisteredMessage {
                channel: channel.into(),
                message_ts: message_ts.into(),
            },
        );
    }

    /// Publishes `{status, step, total}` on `progress:{task_id}`.
    #[instrument(skip(self))]
    pub async fn notify(&self, task_id: Uuid, status: TaskStatus, step: u64, total: u64) -> ChatResult<()> {
        let payload = ProgressPayload {
            status: status_wire_name(status).to_string(),
            step,
            total,
        };
        let message = serde_json::to_string(&payload)?;
        self.pubsub.publish(&Task::progress_channel(task_id), &message).await;
        Ok(())
    }

    /// Subscribes to `progress:{task_id}` and edits the registered message
    /// for each well-formed event, until `cancel` is triggered. Malformed
    /// payloads are logged and skipped; the subscription continues.
    #[instrument(skip(self, cancel))]
    pub async fn start_listening(&self, task_id: Uuid, cancel: CancellationToken) -> ChatResult<()> {
        let channel = Task::progress_channel(task_id);
        self.pubsub
            .subscribe(&channel, cancel, |raw| async {
                let payload: ProgressPayload = match serde_json::from_str(&raw) {
                    Ok(p) => p,
                    Err(err) => {
                        error!(%err, "failed to decode progress message");
                        return;
                    }
                };

                let target = self.registry.lock().expect("mutex poisoned").get(&task_id).cloned();
                let Some(target) = target else {
                    debug!(%task_id, "progress event with no registered message, dropping");
                    return;
                };

                let text = format_progress_message(&payload.status, payload.step, payload.total);
                if let Err(err) = self
                    .chat
                    .update_message(&target.channel, &target.message_ts, &text)
                    .await
                {
                    error!(%err, "failed to update chat message");
                }
            })
            .await?;
        Ok(())
    }
}

fn status_wire_name(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Starting => "starting",
        TaskStatus::Cloning => "cloning",
        TaskStatus::Running => "running",
        TaskStatus::WaitingUser => "waiting_user",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
}
