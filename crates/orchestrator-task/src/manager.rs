//! Owns Task lifecycle and persistence in the pub/sub client's keyed store.

use std::sync::Arc;

use orchestrator_concurrency::ConcurrencyController;
use orchestrator_shared::contracts::PendingQuestionTracker;
use orchestrator_shared::domain::{Task, TaskStatus};
use orchestrator_shared::messaging::PubSubClient;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{TaskError, TaskResult};

/// Result of [`TaskManager::submit_with_result`]: the admitted task's id,
/// and whether it went straight to `starting` or was queued at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub task_id: Uuid,
    pub queued: bool,
}

pub struct TaskManager {
    pubsub: PubSubClient,
    concurrency: Option<Arc<ConcurrencyController>>,
    question_tracker: Option<Arc<dyn PendingQuestionTracker>>,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("has_concurrency_controller", &self.concurrency.is_some())
            .field("has_question_tracker", &self.question_tracker.is_some())
            .finish()
    }
}

impl TaskManager {
    pub fn new(pubsub: PubSubClient) -> Self {
        Self {
            pubsub,
            concurrency: None,
            question_tracker: None,
        }
    }

    pub fn with_concurrency_controller(mut self, controller: Arc<ConcurrencyController>) -> Self {
        self.concurrency = Some(controller);
        self
    }

    pub fn with_question_tracker(mut self, tracker: Arc<dyn PendingQuestionTracker>) -> Self {
        self.question_tracker = Some(tracker);
        self
    }

    async fn load_task(&self, task_id: Uuid) -> TaskResult<Option<Task>> {
        let raw = self.pubsub.get(&Task::storage_key(task_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn persist(&self, task: &Task) -> TaskResult<()> {
        let serialized = serde_json::to_string(task)?;
        self.pubsub
            .set(&Task::storage_key(task.id), &serialized, None)
            .await?;
        Ok(())
    }

    /// Admits `task`, returning its id. A resubmission sharing an existing
    /// idempotency key returns the original id without writing anything.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn submit(&self, task: Task) -> TaskResult<Uuid> {
        Ok(self.submit_with_result(task).await?.task_id)
    }

    /// Same as [`Self::submit`] but additionally reports whether the task
    /// was queued at capacity rather than admitted immediately.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn submit_with_result(&self, mut task: Task) -> TaskResult<SubmitOutcome> {
        let idempotency_key = Task::idempotency_key_storage_key(&task.idempotency_key);

        if let Some(existing) = self.pubsub.get(&idempotency_key).await? {
            let existing_id = Uuid::parse_str(&existing).unwrap_or(task.id);
            info!(
                idempotency_key = %task.idempotency_key,
                existing_task_id = %existing_id,
                "task with same idempotency key already exists"
            );
            return Ok(SubmitOutcome {
                task_id: existing_id,
                queued: false,
            });
        }

        self.pubsub.set(&idempotency_key, &task.id.to_string(), None).await?;
        self.persist(&task).await?;
        info!(status = ?task.status, "task registered");

        let mut queued = false;
        if let Some(controller) = &self.concurrency {
            if !controller.acquire().await {
                controller.enqueue(task.clone()).await;
                queued = true;
                info!(queue_size = controller.queue_size().await, "task queued at capacity");
                return Ok(SubmitOutcome {
                    task_id: task.id,
                    queued,
                });
            }
        }

        task.status = TaskStatus::Starting;
        self.persist(&task).await?;
        info!(status = ?task.status, "task transitioned");

        Ok(SubmitOutcome {
            task_id: task.id,
            queued,
        })
    }

    /// Releases this task's concurrency slot (if any) and, if the slot was
    /// handed to a queued task, transitions that task to `starting` and
    /// returns it so the caller can start a sandbox for it.
    #[instrument(skip(self))]
    pub async fn on_task_complete(&self, task_id: Uuid) -> TaskResult<Option<Task>> {
        info!(%task_id, "task completed");
        let Some(controller) = &self.concurrency else {
            return Ok(None);
        };

        let Some(mut next_task) = controller.release().await else {
            return Ok(None);
        };

        next_task.status = TaskStatus::Starting;
        self.persist(&next_task).await?;
        info!(task_id = %next_task.id, "started queued task");
        Ok(Some(next_task))
    }

    #[instrument(skip(self))]
    pub async fn get_status(&self, task_id: Uuid) -> TaskResult<TaskStatus> {
        match self.load_task(task_id).await? {
            Some(task) => Ok(task.status),
            None => {
                warn!(%task_id, "task not found");
                Err(TaskError::NotFound(task_id))
            }
        }
    }

    /// Returns the full persisted record, for callers (the composition
    /// root's sandbox-driving worker) that need more than the status, such
    /// as the repository URL or the originating channel/thread.
    #[instrument(skip(self))]
    pub async fn get_task(&self, task_id: Uuid) -> TaskResult<Task> {
        self.load_task(task_id).await?.ok_or(TaskError::NotFound(task_id))
    }

    /// Mutates `task_id` to `status` and persists, for lifecycle stages the
    /// Sandbox Manager itself never observes (`starting`, `cloning`) and for
    /// driving `running` onward to `completed`/`failed` as the caller
    /// observes sandbox progress. A task already in a terminal state is left
    /// untouched — terminal statuses are absorbing, not a caller bug, so
    /// this is a silent no-op rather than an error.
    #[instrument(skip(self))]
    pub async fn transition(&self, task_id: Uuid, status: TaskStatus) -> TaskResult<Task> {
        let mut task = self.load_task(task_id).await?.ok_or(TaskError::NotFound(task_id))?;
        if task.status.is_terminal() {
            warn!(%task_id, status = ?task.status, "ignoring transition on terminal task");
            return Ok(task);
        }
        task.status = status;
        self.persist(&task).await?;
        info!(%task_id, status = ?status, "task transitioned");
        Ok(task)
    }

    /// Cancels a non-terminal task. Returns `false` (never an error) for an
    /// absent task or one already in a terminal state.
    #[instrument(skip(self))]
    pub async fn cancel(&self, task_id: Uuid) -> TaskResult<bool> {
        let Some(mut task) = self.load_task(task_id).await? else {
            warn!(%task_id, "cannot cancel: task not found");
            return Ok(false);
        };

        if task.status.is_terminal() {
            warn!(%task_id, status = ?task.status, "cannot cancel: task in terminal state");
            return Ok(false);
        }

        task.status = TaskStatus::Cancelled;
        self.persist(&task).await?;
        info!(%task_id, "task cancelled");
        Ok(true)
    }

    /// Thin pass-through to the injected Question Handler's pending-question
    /// map, or `false` if no tracker was wired.
    pub async fn has_pending_question(&self, task_id: Uuid) -> bool {
        match &self.question_tracker {
            Some(tracker) => tracker.has_pending_question(task_id).await,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    fn sample_task() -> Task {
        Task {
            id: Uuid::new_v4(),
            channel: "C1".into(),
            thread: "T1".into(),
            user: "U1".into(),
            prompt: "do the thing".into(),
            repository_url: "https://github.com/acme/svc".into(),
            status: TaskStatus::Pending,
            created_at: 0.0,
            idempotency_key: Uuid::new_v4().to_string(),
        }
    }

    async fn connected_client() -> PubSubClient {
        let client = PubSubClient::in_memory();
        client.connect().await.unwrap();
        client
    }

    #[tokio::test]
    async fn submit_without_controller_transitions_straight_to_starting() {
        let manager = TaskManager::new(connected_client().await);
        let task = sample_task();
        let task_id = task.id;

        let outcome = manager.submit_with_result(task).await.unwrap();
        assert_eq!(outcome.task_id, task_id);
        assert!(!outcome.queued);
        assert_eq!(manager.get_status(task_id).await.unwrap(), TaskStatus::Starting);
    }

    #[tokio::test]
    async fn resubmitting_same_idempotency_key_returns_existing_id_without_rewriting() {
        let manager = TaskManager::new(connected_client().await);
        let mut task = sample_task();
        task.idempotency_key = "shared-key".into();
        let first_id = task.id;

        let first = manager.submit_with_result(task.clone()).await.unwrap();
        assert_eq!(first.task_id, first_id);

        let mut resubmit = sample_task();
        resubmit.idempotency_key = "shared-key".into();
        let second = manager.submit_with_result(resubmit).await.unwrap();
        assert_eq!(second.task_id, first_id);
        assert!(!second.queued);
    }

    #[tokio::test]
    async fn get_status_on_unknown_task_is_not_found() {
        let manager = TaskManager::new(connected_client().await);
        let err = manager.get_status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_unknown_task_returns_false() {
        let manager = TaskManager::new(connected_client().await);
        assert!(!manager.cancel(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn cancel_terminal_task_returns_false() {
        let manager = TaskManager::new(connected_client().await);
        let mut task = sample_task();
        task.status = TaskStatus::Completed;
        let task_id = task.id;
        manager.submit_with_result(task).await.unwrap();

        // submit_with_result always transitions a newly admitted task away
        // from the caller-supplied status, so force the terminal state back
        // in directly via persistence to exercise the guard.
        let completed = Task {
            status: TaskStatus::Completed,
            ..manager.load_task(task_id).await.unwrap().unwrap()
        };
        manager.persist(&completed).await.unwrap();

        assert!(!manager.cancel(task_id).await.unwrap());
    }

    #[tokio::test]
    async fn cancel_non_terminal_task_transitions_to_cancelled() {
        let manager = TaskManager::new(connected_client().await);
        let task = sample_task();
        let task_id = task.id;
        manager.submit_with_result(task).await.unwrap();

        assert!(manager.cancel(task_id).await.unwrap());
        assert_eq!(manager.get_status(task_id).await.unwrap(), TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn submit_queues_at_capacity_and_leaves_task_pending() {
        let controller = Arc::new(ConcurrencyController::new(1));
        let manager =
            TaskManager::new(connected_client().await).with_concurrency_controller(controller);

        let first = sample_task();
        let first_id = first.id;
        manager.submit_with_result(first).await.unwrap();
        assert_eq!(manager.get_status(first_id).await.unwrap(), TaskStatus::Starting);

        let second = sample_task();
        let second_id = second.id;
        let outcome = manager.submit_with_result(second).await.unwrap();
        assert!(outcome.queued);
        assert_eq!(manager.get_status(second_id).await.unwrap(), TaskStatus::Pending);
    }

    #[tokio::test]
    async fn on_task_complete_starts_the_next_queued_task() {
        let controller = Arc::new(ConcurrencyController::new(1));
        let manager =
            TaskManager::new(connected_client().await).with_concurrency_controller(controller);

        let first = sample_task();
        manager.submit_with_result(first).await.unwrap();

        let second = sample_task();
        let second_id = second.id;
        manager.submit_with_result(second).await.unwrap();

        let next = manager.on_task_complete(Uuid::new_v4()).await.unwrap().unwrap();
        assert_eq!(next.id, second_id);
        assert_eq!(next.status, TaskStatus::Starting);
        assert_eq!(manager.get_status(second_id).await.unwrap(), TaskStatus::Starting);
    }

    #[tokio::test]
    async fn on_task_complete_without_controller_returns_none() {
        let manager = TaskManager::new(connected_client().await);
        assert!(manager.on_task_complete(Uuid::new_v4()).await.unwrap().is_none());
    }

    struct FakeTracker {
        pending: HashSet<Uuid>,
    }

    #[async_trait]
    impl PendingQuestionTracker for StdMutex<FakeTracker> {
        async fn has_pending_question(&self, task_id: Uuid) -> bool {
            self.lock().unwrap().pending.contains(&task_id)
        }
    }

    #[tokio::test]
    async fn has_pending_question_delegates_to_the_injected_tracker() {
        let task_id = Uuid::new_v4();
        let tracker: Arc<dyn PendingQuestionTracker> = Arc::new(StdMutex::new(FakeTracker {
            pending: HashSet::from([task_id]),
        }));
        let manager = TaskManager::new(connected_client().await).with_question_tracker(tracker);

        assert!(manager.has_pending_question(task_id).await);
        assert!(!manager.has_pending_question(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn has_pending_question_without_tracker_is_false() {
        let manager = TaskManager::new(connected_client().await);
        assert!(!manager.has_pending_question(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn get_task_returns_the_full_record() {
        let manager = TaskManager::new(connected_client().await);
        let task = sample_task();
        let task_id = task.id;
        manager.submit_with_result(task.clone()).await.unwrap();

        let loaded = manager.get_task(task_id).await.unwrap();
        assert_eq!(loaded.prompt, task.prompt);
        assert_eq!(loaded.repository_url, task.repository_url);
    }

    #[tokio::test]
    async fn get_task_on_unknown_id_is_not_found() {
        let manager = TaskManager::new(connected_client().await);
        assert!(matches!(
            manager.get_task(Uuid::new_v4()).await,
            Err(TaskError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn transition_moves_a_non_terminal_task_to_the_given_status() {
        let manager = TaskManager::new(connected_client().await);
        let task = sample_task();
        let task_id = task.id;
        manager.submit_with_result(task).await.unwrap();

        let updated = manager.transition(task_id, TaskStatus::Cloning).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Cloning);
        assert_eq!(manager.get_status(task_id).await.unwrap(), TaskStatus::Cloning);
    }

    #[tokio::test]
    async fn transition_on_terminal_task_is_a_no_op() {
        let manager = TaskManager::new(connected_client().await);
        let task = sample_task();
        let task_id = task.id;
        manager.submit_with_result(task).await.unwrap();
        manager.cancel(task_id).await.unwrap();

        let updated = manager.transition(task_id, TaskStatus::Running).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Cancelled);
    }
}
