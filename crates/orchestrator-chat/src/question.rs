//! Couples an in-sandbox question stream to the chat thread and returns
//! the user's reply to the sandbox, with a timeout that cancels the task
//! if nobody answers in time.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use orchestrator_shared::contracts::PendingQuestionTracker;
use orchestrator_shared::domain::{HumanQuestion, Task, TaskStatus};
use orchestrator_shared::messaging::PubSubClient;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::client::ChatClient;
use crate::error::ChatResult;

#[derive(Debug, Clone, Copy)]
pub struct QuestionHandlerConfig {
    pub timeout_seconds: u64,
}

impl Default for QuestionHandlerConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: HumanQuestion::DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

/// Forwards questions from the sandbox to the chat thread and returns the
/// user's reply to the sandbox, via the pub/sub answer channel.
pub struct QuestionHandler<C: ChatClient> {
    pubsub: PubSubClient,
    chat: C,
    config: QuestionHandlerConfig,
    pending: Mutex<HashMap<Uuid, HumanQuestion>>,
    handles: Mutex<HashMap<Uuid, oneshot::Sender<String>>>,
}

impl<C: ChatClient> std::fmt::Debug for QuestionHandler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionHandler")
            .field("timeout_seconds", &self.config.timeout_seconds)
            .finish_non_exhaustive()
    }
}

impl<C: ChatClient> QuestionHandler<C> {
    pub fn new(pubsub: PubSubClient, chat: C) -> Self {
        Self::with_config(pubsub, chat, QuestionHandlerConfig::default())
    }

    pub fn with_config(pubsub: PubSubClient, chat: C, config: QuestionHandlerConfig) -> Self {
        info!(timeout_seconds = config.timeout_seconds, "question handler initialized");
        Self {
            pubsub,
            chat,
            config,
            pending: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes to `question:{task_id}` and runs [`Self::handle_question`]
    /// for each message, until `cancel` is triggered.
    #[instrument(skip(self, cancel))]
    pub async fn start_listening(&self, task_id: Uuid, cancel: CancellationToken) -> ChatResult<()> {
        self.pubsub
            .subscribe(&Task::question_channel(task_id), cancel, |question| async {
                if let Err(err) = self.handle_question(task_id, question).await {
                    warn!(%err, "failed to handle question");
                }
            })
            .await?;
        Ok(())
    }

    /// Runs the full forward flow for one question: registers it, flips the
    /// task to `waiting_user`, posts it to the thread, and waits (bounded by
    /// the configured timeout) for an answer submitted via
    /// [`Self::submit_answer`]. Returns the answer, or `None` on timeout.
    #[instrument(skip(self, question))]
    pub async fn handle_question(&self, task_id: Uuid, question: String) -> ChatResult<Option<String>> {
        let Some(mut task) = self.load_task(task_id).await? else {
            warn!(%task_id, "question for unknown task, dropping");
            return Ok(None);
        };

        let human_question = HumanQuestion::new(task_id, question.clone())
            .with_timeout_seconds(self.config.timeout_seconds);
        self.pending
            .lock()
            .expect("mutex poisoned")
            .insert(task_id, human_question);

        task.status = TaskStatus::WaitingUser;
        self.persist(&task).await?;

        let timeout_text = orchestrator_shared::time::humanize_seconds(self.config.timeout_seconds);
        let message = format!(
            "<@{}> question from the assistant:\n\n{}\n\n_Please reply in this thread. (Timeout: {})_",
            task.user, question, timeout_text
        );
        self.chat
            .send_message(&task.channel, &message, Some(&task.thread))
            .await?;

        let (tx, rx) = oneshot::channel();
        self.handles.lock().expect("mutex poisoned").insert(task_id, tx);

        let outcome = tokio::time::timeout(Duration::from_secs(self.config.timeout_seconds), rx).await;
        self.cleanup(task_id);

        match outcome {
            Ok(Ok(answer)) => {
                self.pubsub.publish(&Task::answer_channel(task_id), &answer).await;
                task.status = TaskStatus::Running;
                self.persist(&task).await?;
                info!(%task_id, "answer received, task resumed");
                Ok(Some(answer))
            }
            _ => {
                warn!(%task_id, "question timed out");
                task.status = TaskStatus::Cancelled;
                self.persist(&task).await?;

                let timeout_message = format!(
                    "<@{}> Timeout. Task cancelled due to no response to the question.",
                    task.user
                );
                self.chat
                    .send_message(&task.channel, &timeout_message, Some(&task.thread))
                    .await?;
                Ok(None)
            }
        }
    }

    /// Fulfills a registered completion handle. Returns `false` (never an
    /// error) when no question is outstanding, including a late answer
    /// that arrives after the handler already timed out and cleaned up.
    #[instrument(skip(self, answer))]
    pub async fn submit_answer(&self, task_id: Uuid, answer: String) -> bool {
        let sender = self.handles.lock().expect("mutex poisoned").remove(&task_id);
        match sender {
            Some(sender) => {
                let delivered = sender.send(answer).is_ok();
                if delivered {
                    info!(%task_id, "answer submitted");
                } else {
                    warn!(%task_id, "answer receiver already dropped");
                }
                delivered
            }
            None => {
                warn!(%task_id, "no pending question for task");
                false
            }
        }
    }

    pub fn has_pending_question(&self, task_id: Uuid) -> bool {
        self.pending.lock().expect("mutex poisoned").contains_key(&task_id)
    }

    pub fn get_pending_question(&self, task_id: Uuid) -> Option<HumanQuestion> {
        self.pending.lock().expect("mutex poisoned").get(&task_id).cloned()
    }

    fn cleanup(&self, task_id: Uuid) {
        self.pending.lock().expect("mutex poisoned").remove(&task_id);
        self.handles.lock().expect("mutex poisoned").remove(&task_id);
    }

    async fn load_task(&self, task_id: Uuid) -> ChatResult<Option<Task>> {
        let raw = self.pubsub.get(&Task::storage_key(task_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn persist(&self, task: &Task) -> ChatResult<()> {
        let serialized = serde_json::to_string(task)?;
        self.pubsub.set(&Task::storage_key(task.id), &serialized, None).await?;
        Ok(())
    }
}

#[async_trait]
impl<C: ChatClient> PendingQuestionTracker for QuestionHandler<C> {
    async fn has_pending_question(&self, task_id: Uuid) -> bool {
        Self::has_pending_question(self, task_id)
    }
}
