//! Admission slot plus FIFO wait queue enforcing a global ceiling on
//! simultaneously executing tasks.
//!
//! `acquire`/`enqueue`/`release` are the only mutators; all three take the
//! same lock, so `running_count` always reflects the number of slot holders
//! that have not yet released, even under arbitrary interleaving.

use std::collections::VecDeque;

use orchestrator_shared::domain::Task;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

struct Inner {
    max_concurrent: u32,
    running_count: u32,
    queue: VecDeque<Task>,
}

/// Bounded-concurrency admission controller. Cheap to share: wrap in an
/// `Arc` at the composition root the same way `PubSubClient` is shared.
#[derive(Debug)]
pub struct ConcurrencyController {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("max_concurrent", &self.max_concurrent)
            .field("running_count", &self.running_count)
            .field("queue_size", &self.queue.len())
            .finish()
    }
}

impl ConcurrencyController {
    pub fn new(max_concurrent: u32) -> Self {
        info!(max_concurrent, "concurrency controller initialized");
        Self {
            inner: Mutex::new(Inner {
                max_concurrent,
                running_count: 0,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Attempts to take an admission slot. Returns `true` and increments
    /// `running_count` if one was free; returns `false` without mutating
    /// anything otherwise. A caller that gets `false` is expected to
    /// [`Self::enqueue`] the task.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.running_count < inner.max_concurrent {
            inner.running_count += 1;
            debug!(
                running = inner.running_count,
                max = inner.max_concurrent,
                "acquired admission slot"
            );
            true
        } else {
            debug!(
                running = inner.running_count,
                max = inner.max_concurrent,
                "at capacity, slot not acquired"
            );
            false
        }
    }

    /// Appends `task` to the FIFO wait queue.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn enqueue(&self, task: Task) {
        let mut inner = self.inner.lock().await;
        inner.queue.push_back(task);
        info!(queue_size = inner.queue.len(), "task enqueued");
    }

    /// Releases the caller's admission slot. If the wait queue is non-empty,
    /// the head of the queue is dequeued, the slot is atomically transferred
    /// to it (no window where the ceiling is exceeded or a spurious wake-up
    /// could occur), and that task is returned for the caller to start.
    #[instrument(skip(self))]
    pub async fn release(&self) -> Option<Task> {
        let mut inner = self.inner.lock().await;
        inner.running_count = inner.running_count.saturating_sub(1);

        let next = inner.queue.pop_front();
        if let Some(task) = &next {
            inner.running_count += 1;
            info!(
                task_id = %task.id,
                running = inner.running_count,
                max = inner.max_concurrent,
                queue_size = inner.queue.len(),
                "dequeued task, slot transferred"
            );
        } else {
            debug!(running = inner.running_count, "slot released, queue empty");
        }
        next
    }

    pub async fn running_count(&self) -> u32 {
        self.inner.lock().await.running_count
    }

    pub async fn queue_size(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn is_at_capacity(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.running_count >= inner.max_concurrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_task() -> Task {
        Task {
            id: Uuid::new_v4(),
            channel: "C1".into(),
            thread: "T1".into(),
            user: "U1".into(),
            prompt: "do the thing".into(),
            repository_url: "https://github.com/acme/svc".into(),
            status: orchestrator_shared::domain::TaskStatus::Pending,
            created_at: 0.0,
            idempotency_key: "k".into(),
        }
    }

    #[tokio::test]
    async fn acquire_succeeds_while_under_capacity() {
        let controller = ConcurrencyController::new(2);
        assert!(controller.acquire().await);
        assert!(controller.acquire().await);
        assert_eq!(controller.running_count().await, 2);
    }

    #[tokio::test]
    async fn acquire_fails_at_capacity() {
        let controller = ConcurrencyController::new(1);
        assert!(controller.acquire().await);
        assert!(!controller.acquire().await);
        assert_eq!(controller.running_count().await, 1);
    }

    #[tokio::test]
    async fn is_at_capacity_reflects_running_count() {
        let controller = ConcurrencyController::new(1);
        assert!(!controller.is_at_capacity().await);
        controller.acquire().await;
        assert!(controller.is_at_capacity().await);
    }

    #[tokio::test]
    async fn release_with_empty_queue_returns_none_and_decrements() {
        let controller = ConcurrencyController::new(1);
        controller.acquire().await;
        assert!(controller.release().await.is_none());
        assert_eq!(controller.running_count().await, 0);
    }

    #[tokio::test]
    async fn release_clamps_at_zero() {
        let controller = ConcurrencyController::new(1);
        assert!(controller.release().await.is_none());
        assert_eq!(controller.running_count().await, 0);
    }

    #[tokio::test]
    async fn release_transfers_slot_to_queued_task_keeping_running_count_stable() {
        let controller = ConcurrencyController::new(1);
        assert!(controller.acquire().await);

        let queued = sample_task();
        let queued_id = queued.id;
        controller.enqueue(queued).await;

        let next = controller.release().await.unwrap();
        assert_eq!(next.id, queued_id);
        // The slot was transferred, not freed: running_count is unchanged.
        assert_eq!(controller.running_count().await, 1);
        assert_eq!(controller.queue_size().await, 0);
    }

    #[tokio::test]
    async fn fifo_fairness_admits_earlier_enqueued_task_first() {
        let controller = ConcurrencyController::new(1);
        controller.acquire().await;

        let mut task_a = sample_task();
        task_a.user = "first".into();
        let mut task_b = sample_task();
        task_b.user = "second".into();
        let a_id = task_a.id;

        controller.enqueue(task_a).await;
        controller.enqueue(task_b).await;

        let next = controller.release().await.unwrap();
        assert_eq!(next.id, a_id);
    }

    #[tokio::test]
    async fn ceiling_never_exceeded_under_interleaved_acquire_release() {
        let controller = ConcurrencyController::new(3);
        for _ in 0..5 {
            controller.enqueue(sample_task()).await;
        }
        for _ in 0..3 {
            assert!(controller.acquire().await);
        }
        assert!(!controller.acquire().await);
        assert_eq!(controller.running_count().await, 3);

        for _ in 0..5 {
            let _ = controller.release().await;
            assert!(controller.running_count().await <= 3);
        }
    }
}
