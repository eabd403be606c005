//! Sandbox Manager error taxonomy.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to create sandbox for task {task_id}: {reason}")]
    SandboxCreationError { task_id: Uuid, reason: String },

    #[error("no live sandbox found for task {0}")]
    NotFound(Uuid),

    #[error("container platform call failed: {0}")]
    PlatformFault(String),

    #[error("container platform is unavailable (circuit open)")]
    CircuitOpen,
}

impl SandboxError {
    /// Platform faults and an open circuit are recoverable: the caller may
    /// retry once the platform or the breaker recovers. A creation failure
    /// whose cause is itself a platform fault is likewise recoverable; one
    /// that stems from a validation problem upstream is not, but that
    /// distinction lives with `ValidationError` before a `SandboxConfig`
    /// is ever built.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SandboxError::PlatformFault(_) | SandboxError::CircuitOpen
        )
    }
}

pub type SandboxResult<T> = Result<T, SandboxError>;
