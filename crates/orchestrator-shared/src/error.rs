//! Error taxonomy shared by every orchestrator component.
//!
//! Each concern gets its own enum rather than one grab-bag type. Components
//! downstream (sandbox, task, chat) define their own error enums and convert
//! into or wrap these via `#[from]`; nothing here depends on them.

use thiserror::Error;

/// Faults talking to the pub/sub and key-value server.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("not connected to pub/sub server")]
    NotConnected,

    #[error("connection to pub/sub server failed: {0}")]
    ConnectionFailed(String),

    #[error("publish to channel '{channel}' failed: {reason}")]
    PublishFailed { channel: String, reason: String },

    #[error("set/get operation on key '{key}' failed: {reason}")]
    StoreFailed { key: String, reason: String },

    #[error("failed to decode message payload as UTF-8")]
    InvalidEncoding,

    #[error("failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MessagingError {
    /// Connection-shaped faults are recoverable: the caller may retry once
    /// the background reconnection loop restores connectivity. Encoding and
    /// serialization faults are not — they indicate a programming error or a
    /// corrupted payload, not transient unavailability.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MessagingError::NotConnected
                | MessagingError::ConnectionFailed(_)
                | MessagingError::PublishFailed { .. }
                | MessagingError::StoreFailed { .. }
        )
    }
}

/// Malformed intake: missing repository URL, empty prompt, wrong host, etc.
/// These never produce a Task and are reported directly to the user.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("no repository URL found in message text")]
    MissingRepositoryUrl,

    #[error("repository URL '{0}' is not an HTTPS URL on an accepted host")]
    UnacceptedRepositoryHost(String),

    #[error("idempotency key must not be empty")]
    EmptyIdempotencyKey,

    #[error("task id '{0}' is too short to derive a container name from")]
    TaskIdTooShort(String),
}

impl ValidationError {
    /// Validation errors are never recoverable by retrying the same input;
    /// the caller must fix the input and resubmit.
    pub fn is_recoverable(&self) -> bool {
        false
    }
}

/// Faults loading and validating the immutable startup configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration value '{0}'")]
    Missing(String),

    #[error("configuration value '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigError {
    /// Configuration faults are startup-fatal, never recoverable in-process.
    pub fn is_recoverable(&self) -> bool {
        false
    }
}

/// Umbrella error for the shared crate's own public operations (the pub/sub
/// client and configuration loader). Downstream crates compose their own
/// umbrella errors from this one plus their own concern-specific variants
/// rather than depending on each other's error types directly.
#[derive(Debug, Error)]
pub enum SharedError {
    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SharedError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            SharedError::Messaging(e) => e.is_recoverable(),
            SharedError::Validation(e) => e.is_recoverable(),
            SharedError::Config(e) => e.is_recoverable(),
            SharedError::Internal(_) => false,
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messaging_connection_faults_are_recoverable() {
        assert!(MessagingError::NotConnected.is_recoverable());
        assert!(MessagingError::ConnectionFailed("refused".into()).is_recoverable());
        assert!(MessagingError::PublishFailed {
            channel: "progress:x".into(),
            reason: "timeout".into()
        }
        .is_recoverable());
    }

    #[test]
    fn messaging_encoding_faults_are_not_recoverable() {
        assert!(!MessagingError::InvalidEncoding.is_recoverable());
    }

    #[test]
    fn validation_errors_are_never_recoverable() {
        assert!(!ValidationError::EmptyPrompt.is_recoverable());
        assert!(!ValidationError::MissingRepositoryUrl.is_recoverable());
    }

    #[test]
    fn config_errors_are_never_recoverable() {
        assert!(!ConfigError::Missing("redis_url".into()).is_recoverable());
    }

    #[test]
    fn shared_error_delegates_recoverability() {
        let err: SharedError = MessagingError::NotConnected.into();
        assert!(err.is_recoverable());

        let err: SharedError = ValidationError::EmptyPrompt.into();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn shared_error_display_is_transparent() {
        let err: SharedError = ValidationError::MissingRepositoryUrl.into();
        assert_eq!(err.to_string(), "no repository URL found in message text");
    }
}
