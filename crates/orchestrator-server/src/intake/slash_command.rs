//! The slash-command entry point (§4.7): a synchronous request that must be
//! acknowledged immediately, independent of how long admission itself takes.
//! Unlike a mention, a slash command carries its own `response_url` for the
//! deferred acknowledgement rather than addressing a channel/thread pair
//! directly.

use orchestrator_chat::ChatClient;
use orchestrator_task::TaskManager;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::common::{build_task, IntakeRequest};
use crate::error::OrchestratorResult;

/// One slash-command invocation. `channel` and `user` come from the
/// platform's request body; `response_url` is where the immediate
/// acknowledgement is delivered, `text` is the command's argument string.
#[derive(Debug, Clone)]
pub struct SlashCommandEvent {
    pub channel: String,
    pub user: String,
    pub response_url: String,
    pub text: String,
}

/// Outcome of one slash command. There is no message timestamp to register
/// with the Progress Notifier here — the acknowledgement goes to
/// `response_url`, not a channel post, so progress updates for this task
/// start from the first message a listener posts once the sandbox runs.
#[derive(Debug, Clone)]
pub enum SlashCommandOutcome {
    Started { task_id: Uuid },
    Queued { task_id: Uuid },
    Rejected { reason: String },
}

pub struct SlashCommandHandler<C: ChatClient> {
    chat: C,
    task_manager: Arc<TaskManager>,
    repository_host: String,
}

impl<C: ChatClient> SlashCommandHandler<C> {
    pub fn new(chat: C, task_manager: Arc<TaskManager>, repository_host: impl Into<String>) -> Self {
        Self {
            chat,
            task_manager,
            repository_host: repository_host.into(),
        }
    }

    /// There is no chat thread to reply in for a slash command, so the
    /// request's own channel doubles as the thread root: every later
    /// progress/question/result post for this task lands as a new message
    /// in that channel rather than threaded under one.
    ///
    /// The acknowledgement is posted to `event.response_url` before
    /// `submit_with_result`'s pub/sub writes run, so the ≤ 3s response
    /// deadline is met independent of how long admission takes — unlike a
    /// mention's thread reply, which can afford to wait on submission since
    /// nothing times the chat platform out on it.
    #[instrument(skip(self, event))]
    pub async fn handle(
        &self,
        event: SlashCommandEvent,
        created_at: f64,
    ) -> OrchestratorResult<SlashCommandOutcome> {
        let request = IntakeRequest {
            channel: event.channel.clone(),
            thread: event.channel.clone(),
            user: event.user.clone(),
            text: event.text.clone(),
        };

        let task = match build_task(&request, &self.repository_host, created_at) {
            Ok(task) => task,
            Err(err) => {
                warn!(%err, "rejecting slash-command intake");
                self.chat
                    .respond_to_command(&event.response_url, &err.to_string())
                    .await?;
                return Ok(SlashCommandOutcome::Rejected {
                    reason: err.to_string(),
                });
            }
        };

        let task_id = task.id;
        self.chat
            .respond_to_command(&event.response_url, &format!("起動中... (task id: {task_id})"))
            .await?;

        let outcome = self.task_manager.submit_with_result(task).await?;
        if outcome.queued {
            info!(%task_id, "slash command queued at capacity");
            Ok(SlashCommandOutcome::Queued {
                task_id: outcome.task_id,
            })
        } else {
            Ok(SlashCommandOutcome::Started {
                task_id: outcome.task_id,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_chat::InMemoryChatClient;
    use orchestrator_shared::messaging::PubSubClient;

    async fn connected_client() -> PubSubClient {
        let client = PubSubClient::in_memory();
        client.connect().await.unwrap();
        client
    }

    fn sample_event(text: &str) -> SlashCommandEvent {
        SlashCommandEvent {
            channel: "C1".into(),
            user: "U1".into(),
            response_url: "https://example.com/respond".into(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn happy_path_submits_and_acknowledges() {
        let chat = InMemoryChatClient::new();
        let task_manager = Arc::new(TaskManager::new(connected_client().await));
        let handler = SlashCommandHandler::new(chat, task_manager.clone(), "github.com");

        let outcome = handler
            .handle(
                sample_event("https://github.com/acme/svc please audit"),
                0.0,
            )
            .await
            .unwrap();

        let task_id = match outcome {
            SlashCommandOutcome::Started { task_id } => task_id,
            other => panic!("expected Started, got {other:?}"),
        };
        assert_eq!(
            task_manager.get_status(task_id).await.unwrap(),
            orchestrator_shared::domain::TaskStatus::Starting
        );
        let responses = handler.chat.command_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].response_url, "https://example.com/respond");
        assert!(responses[0].text.contains(&task_id.to_string()));
        assert!(handler.chat.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn missing_repository_url_is_still_acknowledged_via_response_url() {
        let chat = InMemoryChatClient::new();
        let task_manager = Arc::new(TaskManager::new(connected_client().await));
        let handler = SlashCommandHandler::new(chat, task_manager, "github.com");

        let outcome = handler.handle(sample_event("please audit"), 0.0).await.unwrap();

        assert!(matches!(outcome, SlashCommandOutcome::Rejected { .. }));
        let responses = handler.chat.command_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].response_url, "https://example.com/respond");
        assert!(handler.chat.sent_messages().is_empty());
    }
}
