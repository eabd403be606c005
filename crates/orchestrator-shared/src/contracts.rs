//! Narrow capability contracts that let one component depend on another's
//! behavior without depending on its crate, so the composition root wires
//! concrete collaborators together instead of crates reaching across each
//! other directly.

use async_trait::async_trait;
use uuid::Uuid;

/// Read-only view over a Question Handler's outstanding-question map.
///
/// Implemented by the Question Handler; held by the Task Manager as a
/// trait object so it can answer `has_pending_question` without the
/// `orchestrator-task` crate depending on `orchestrator-chat`.
#[async_trait]
pub trait PendingQuestionTracker: Send + Sync {
    async fn has_pending_question(&self, task_id: Uuid) -> bool;
}
