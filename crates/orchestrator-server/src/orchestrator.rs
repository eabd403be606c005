//! The composition root: wires the Pub/Sub Client, Task Manager, Sandbox
//! Manager, Chat Client, Progress Notifier, Question Handler, and
//! Concurrency Controller together and drives one task from admission
//! through sandbox execution to a posted result.

use std::sync::Arc;
use std::time::Duration;

use orchestrator_chat::{post_result, ChatClient, ProgressNotifier, QuestionHandler};
use orchestrator_sandbox::SandboxManager;
use orchestrator_shared::domain::{SandboxStatus, Task, TaskStatus};
use orchestrator_shared::messaging::PubSubClient;
use orchestrator_task::TaskManager;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::OrchestratorResult;
use crate::intake::{
    MentionEvent, MentionHandler, MentionOutcome, SlashCommandEvent, SlashCommandHandler,
    SlashCommandOutcome,
};

/// How many progress steps a task is reported against. The stages are
/// `cloning`, `running`, and the terminal post, so three fits the fraction
/// the chat thread shows without overstating precision.
const PROGRESS_TOTAL_STEPS: u64 = 3;

/// How the sandbox-driving worker found out an execution had ended.
enum TaskOutcome {
    Completed(String),
    Failed(String),
    Cancelled,
}

pub struct Orchestrator {
    pubsub: PubSubClient,
    chat: Arc<dyn ChatClient>,
    task_manager: Arc<TaskManager>,
    sandbox_manager: Arc<SandboxManager>,
    progress: Arc<ProgressNotifier<Arc<dyn ChatClient>>>,
    question: Arc<QuestionHandler<Arc<dyn ChatClient>>>,
    mention: MentionHandler<Arc<dyn ChatClient>>,
    slash_command: SlashCommandHandler<Arc<dyn ChatClient>>,
    sandbox_image: String,
    /// Held as `Zeroizing` so the plaintext token is scrubbed from memory
    /// as soon as the orchestrator is dropped, rather than lingering as an
    /// ordinary `String` until the allocator reuses the page.
    repository_credential_token: Option<zeroize::Zeroizing<String>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        pubsub: PubSubClient,
        chat: Arc<dyn ChatClient>,
        task_manager: Arc<TaskManager>,
        sandbox_manager: Arc<SandboxManager>,
        progress: Arc<ProgressNotifier<Arc<dyn ChatClient>>>,
        question: Arc<QuestionHandler<Arc<dyn ChatClient>>>,
        repository_host: impl Into<String>,
        sandbox_image: impl Into<String>,
        repository_credential_token: Option<secrecy::SecretString>,
    ) -> Self {
        let repository_host = repository_host.into();
        Self {
            pubsub,
            chat: chat.clone(),
            task_manager: task_manager.clone(),
            sandbox_manager,
            progress,
            question,
            mention: MentionHandler::new(chat.clone(), task_manager.clone(), repository_host.clone()),
            slash_command: SlashCommandHandler::new(chat, task_manager, repository_host),
            sandbox_image: sandbox_image.into(),
            repository_credential_token: repository_credential_token
                .map(|t| zeroize::Zeroizing::new(t.expose_secret().to_string())),
        }
    }

    /// Handles one chat mention: admits it via the Task Manager and, if it
    /// wasn't just queued at capacity, spawns its sandbox-driving worker.
    #[instrument(skip(self, event))]
    pub async fn submit_mention(
        self: &Arc<Self>,
        event: MentionEvent,
        created_at: f64,
    ) -> OrchestratorResult<MentionOutcome> {
        let outcome = self.mention.handle(event, created_at).await?;
        if let MentionOutcome::Started {
            task_id,
            channel,
            message_ts,
        } = &outcome
        {
            self.progress.register_message(*task_id, channel.clone(), message_ts.clone());
            self.spawn_task(*task_id);
        }
        Ok(outcome)
    }

    /// Handles one slash-command invocation the same way, minus message
    /// registration: there is no chat message address to edit yet.
    #[instrument(skip(self, event))]
    pub async fn submit_slash_command(
        self: &Arc<Self>,
        event: SlashCommandEvent,
        created_at: f64,
    ) -> OrchestratorResult<SlashCommandOutcome> {
        let outcome = self.slash_command.handle(event, created_at).await?;
        if let SlashCommandOutcome::Started { task_id } = &outcome {
            self.spawn_task(*task_id);
        }
        Ok(outcome)
    }

    /// Cancels a non-terminal task, tearing down its sandbox if one exists.
    #[instrument(skip(self))]
    pub async fn cancel_task(&self, task_id: Uuid) -> OrchestratorResult<bool> {
        let cancelled = self.task_manager.cancel(task_id).await?;
        if cancelled {
            self.sandbox_manager.destroy(task_id).await?;
        }
        Ok(cancelled)
    }

    fn spawn_task(self: &Arc<Self>, task_id: Uuid) {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.run_task(task_id).await;
        });
    }

    /// Drives one admitted task from `starting` through sandbox creation,
    /// execution, and result posting, then releases its concurrency slot and
    /// starts whatever was queued behind it.
    #[instrument(skip(self))]
    async fn run_task(self: Arc<Self>, task_id: Uuid) {
        let task = match self.task_manager.get_task(task_id).await {
            Ok(task) => task,
            Err(err) => {
                error!(%task_id, %err, "task vanished before it could be started");
                return;
            }
        };

        if let Err(err) = self.task_manager.transition(task_id, TaskStatus::Cloning).await {
            error!(%task_id, %err, "failed to transition to cloning");
            return;
        }
        let _ = self.progress.notify(task_id, TaskStatus::Cloning, 1, PROGRESS_TOTAL_STEPS).await;

        let mut config_builder = orchestrator_shared::domain::SandboxConfig::builder(self.sandbox_image.clone())
            .repository_url(task.repository_url.clone())
            .prompt(task.prompt.clone());
        if let Some(token) = &self.repository_credential_token {
            config_builder = config_builder.credential_token(token.as_str().to_string());
        }
        let config = config_builder.build();

        if let Err(err) = self.sandbox_manager.create(task_id, config).await {
            warn!(%task_id, %err, "sandbox creation failed");
            self.fail_task(&task, "sandbox creation failed").await;
            self.finish(task_id).await;
            return;
        }

        if let Err(err) = self.task_manager.transition(task_id, TaskStatus::Running).await {
            error!(%task_id, %err, "failed to transition to running");
            self.finish(task_id).await;
            return;
        }
        let _ = self.progress.notify(task_id, TaskStatus::Running, 2, PROGRESS_TOTAL_STEPS).await;

        let cancel = CancellationToken::new();
        let progress_listener = {
            let progress = Arc::clone(&self.progress);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(err) = progress.start_listening(task_id, cancel).await {
                    error!(%task_id, %err, "progress listener stopped");
                }
            })
        };
        let question_listener = {
            let question = Arc::clone(&self.question);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(err) = question.start_listening(task_id, cancel).await {
                    error!(%task_id, %err, "question listener stopped");
                }
            })
        };

        let outcome = self.await_completion(task_id).await;
        cancel.cancel();
        let _ = progress_listener.await;
        let _ = question_listener.await;

        match outcome {
            TaskOutcome::Completed(result_text) => {
                if let Err(err) = self.task_manager.transition(task_id, TaskStatus::Completed).await {
                    error!(%task_id, %err, "failed to transition to completed");
                }
                let _ = self.progress.notify(task_id, TaskStatus::Completed, 3, PROGRESS_TOTAL_STEPS).await;
                if let Err(err) = post_result(&self.chat, task_id, &task.channel, &task.thread, &result_text).await {
                    error!(%task_id, %err, "failed to post result");
                }
            }
            TaskOutcome::Failed(reason) => {
                self.fail_task(&task, &reason).await;
            }
            TaskOutcome::Cancelled => {
                info!(%task_id, "task ended cancelled, nothing further to post");
            }
        }

        self.sandbox_manager.destroy(task_id).await.ok();
        self.finish(task_id).await;
    }

    /// Transitions a task to `failed`, notifies progress, and posts the
    /// failure reason as the task's result.
    async fn fail_task(&self, task: &Task, reason: &str) {
        if let Err(err) = self.task_manager.transition(task.id, TaskStatus::Failed).await {
            error!(task_id = %task.id, %err, "failed to transition to failed");
        }
        let _ = self.progress.notify(task.id, TaskStatus::Failed, PROGRESS_TOTAL_STEPS, PROGRESS_TOTAL_STEPS).await;
        let message = format!("Task failed: {reason}");
        if let Err(err) = post_result(&self.chat, task.id, &task.channel, &task.thread, &message).await {
            error!(task_id = %task.id, %err, "failed to post failure result");
        }
    }

    /// Releases `task_id`'s concurrency slot (if any) and starts whatever
    /// queued task it was handed to.
    async fn finish(self: &Arc<Self>, task_id: Uuid) {
        match self.task_manager.on_task_complete(task_id).await {
            Ok(Some(next_task)) => self.spawn_task(next_task.id),
            Ok(None) => {}
            Err(err) => error!(%task_id, %err, "failed to release concurrency slot"),
        }
    }

    /// Waits for either a result message on `result:{task_id}` or for the
    /// task's own status (set externally by cancellation or a HITL timeout)
    /// or the sandbox's own status to report a terminal outcome.
    async fn await_completion(&self, task_id: Uuid) -> TaskOutcome {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(1);
        let result_channel = Task::result_channel(task_id);
        let pubsub = self.pubsub.clone();
        let listen_cancel = CancellationToken::new();
        let listener_cancel_handle = listen_cancel.clone();
        let listener = tokio::spawn(async move {
            let _ = pubsub
                .subscribe(&result_channel, listener_cancel_handle, |message| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(message).await;
                    }
                })
                .await;
        });

        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        let outcome = loop {
            tokio::select! {
                biased;
                Some(result_text) = rx.recv() => break TaskOutcome::Completed(result_text),
                _ = ticker.tick() => {
                    match self.task_manager.get_status(task_id).await {
                        Ok(TaskStatus::Cancelled) => break TaskOutcome::Cancelled,
                        Ok(TaskStatus::Failed) => break TaskOutcome::Failed("task reported failed".to_string()),
                        Ok(_) => {}
                        Err(err) => break TaskOutcome::Failed(format!("task record lost: {err}")),
                    }
                    if let Ok(SandboxStatus::Failed) = self.sandbox_manager.get_status(task_id).await {
                        break TaskOutcome::Failed("sandbox reported failure".to_string());
                    }
                }
            }
        };

        listen_cancel.cancel();
        let _ = listener.await;
        outcome
    }
}
