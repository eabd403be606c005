//! Umbrella error for the composition root's own public operations.
//! Intake and task-execution code composes this from the per-concern errors
//! of every crate it depends on rather than inventing new variants for
//! faults that already have a home downstream.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Chat(#[from] orchestrator_chat::ChatError),

    #[error(transparent)]
    Task(#[from] orchestrator_task::TaskError),

    #[error(transparent)]
    Sandbox(#[from] orchestrator_sandbox::SandboxError),

    #[error(transparent)]
    Messaging(#[from] orchestrator_shared::error::MessagingError),

    #[error(transparent)]
    Validation(#[from] orchestrator_shared::error::ValidationError),

    #[error(transparent)]
    Config(#[from] orchestrator_shared::error::ConfigError),
}

impl OrchestratorError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            OrchestratorError::Chat(e) => e.is_recoverable(),
            OrchestratorError::Task(e) => e.is_recoverable(),
            OrchestratorError::Sandbox(e) => e.is_recoverable(),
            OrchestratorError::Messaging(e) => e.is_recoverable(),
            OrchestratorError::Validation(e) => e.is_recoverable(),
            OrchestratorError::Config(e) => e.is_recoverable(),
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
