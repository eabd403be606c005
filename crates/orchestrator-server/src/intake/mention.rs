//! The mention entry point (§4.7): a chat mention carrying free-form text.
//! Extracts a repository URL, posts an acknowledgement to the thread, and
//! submits the resulting Task to the Task Manager.

use orchestrator_chat::ChatClient;
use orchestrator_shared::error::ValidationError;
use orchestrator_task::TaskManager;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::common::{build_task, IntakeRequest};
use crate::error::OrchestratorResult;

/// `{channel, thread, user, text}` as received from the chat platform.
#[derive(Debug, Clone)]
pub struct MentionEvent {
    pub channel: String,
    pub thread: String,
    pub user: String,
    pub text: String,
}

/// What happened to one mention, carrying what the caller needs to keep
/// driving it: the acknowledgement message's address, for the composition
/// root to register with the Progress Notifier.
#[derive(Clone)]
pub enum MentionOutcome {
    /// Admitted immediately; a sandbox should be started for it.
    Started {
        task_id: Uuid,
        channel: String,
        message_ts: String,
    },
    /// Queued at capacity; it stays `pending` until a slot frees up.
    Queued {
        task_id: Uuid,
        channel: String,
        message_ts: String,
    },
    /// Malformed intake; no Task was created.
    Rejected,
}

pub struct MentionHandler<C: ChatClient> {
    chat: C,
    task_manager: Arc<TaskManager>,
    repository_host: String,
}

impl<C: ChatClient> MentionHandler<C> {
    pub fn new(chat: C, task_manager: Arc<TaskManager>, repository_host: impl Into<String>) -> Self {
        Self {
            chat,
            task_manager,
            repository_host: repository_host.into(),
        }
    }

    #[instrument(skip(self, event))]
    pub async fn handle(&self, event: MentionEvent, created_at: f64) -> OrchestratorResult<MentionOutcome> {
        let request = IntakeRequest {
            channel: event.channel.clone(),
            thread: event.thread.clone(),
            user: event.user.clone(),
            text: event.text.clone(),
        };

        let task = match build_task(&request, &self.repository_host, created_at) {
            Ok(task) => task,
            Err(err) => {
                warn!(%err, "rejecting mention intake");
                self.chat
                    .send_message(&event.channel, &rejection_text(&err), Some(&event.thread))
                    .await?;
                return Ok(MentionOutcome::Rejected);
            }
        };

        let task_id = task.id;
        let message_ts = self
            .chat
            .send_message(
                &event.channel,
                &format!("起動中... (task id: {task_id})"),
                Some(&event.thread),
            )
            .await?;

        let outcome = self.task_manager.submit_with_result(task).await?;
        if outcome.queued {
            info!(%task_id, "mention queued at capacity");
            Ok(MentionOutcome::Queued {
                task_id: outcome.task_id,
                channel: event.channel,
                message_ts,
            })
        } else {
            Ok(MentionOutcome::Started {
                task_id: outcome.task_id,
                channel: event.channel,
                message_ts,
            })
        }
    }
}

/// User-facing text for a validation failure. Only the missing-URL case is
/// named explicitly in §4.7 ("please specify a repository URL"); every
/// other validation error uses its own display message.
fn rejection_text(err: &ValidationError) -> String {
    match err {
        ValidationError::MissingRepositoryUrl => "please specify a repository URL".to_string(),
        other => other.to_string(),
    }
}


impl std::fmt::Debug for MentionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MentionOutcome::Started { task_id, .. } => {
                write!(f, "Started({task_id})")
            }
            MentionOutcome::Queued { task_id, .. } => write!(f, "Queued({task_id})"),
            MentionOutcome::Rejected => write!(f, "Rejected"),
        }
    }
}
