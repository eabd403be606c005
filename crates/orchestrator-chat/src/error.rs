//! Chat-boundary and HITL error taxonomy.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat platform call failed: {0}")]
    PlatformFault(String),

    #[error(transparent)]
    Messaging(#[from] orchestrator_shared::error::MessagingError),

    #[error("failed to decode stored task record: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("no task found for id {0}")]
    TaskNotFound(Uuid),
}

impl ChatError {
    /// A chat-platform fault or messaging fault is recoverable; a corrupt
    /// or missing task record is not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ChatError::PlatformFault(_) => true,
            ChatError::Messaging(e) => e.is_recoverable(),
            ChatError::Corrupt(_) | ChatError::TaskNotFound(_) => false,
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
