//! Task Manager error taxonomy.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Messaging(#[from] orchestrator_shared::error::MessagingError),

    #[error("failed to decode stored task record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl TaskError {
    /// A messaging fault is recoverable (retry once connectivity is
    /// restored); a missing or corrupt record is not — the caller needs a
    /// different id or the record needs re-seeding, not a retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TaskError::Messaging(e) => e.is_recoverable(),
            TaskError::NotFound(_) | TaskError::Corrupt(_) => false,
        }
    }
}

pub type TaskResult<T> = Result<T, TaskError>;
