//! Pub/sub envelopes: the advisory `TaskMessage`, the progress payload the
//! Progress Notifier actually speaks on the wire, and `HumanQuestion`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Advisory envelope type. Nothing in the core currently requires decoding
/// this shape off the wire (the progress channel uses `ProgressPayload`
/// directly, and the question/answer channels carry plain text) but it
/// documents the taxonomy of what flows through pub/sub and gives tests and
/// future channels a common shape to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Progress,
    Result,
    Question,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: Uuid,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub payload: HashMap<String, serde_json::Value>,
}

/// Exact wire shape published by `Progress Notifier::notify` on
/// `progress:{task_id}` and decoded by `start_listening`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub status: String,
    pub step: u64,
    pub total: u64,
}

/// An outstanding human-in-the-loop question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanQuestion {
    pub task_id: Uuid,
    pub question: String,
    pub options: Option<Vec<String>>,
    pub timeout_seconds: u64,
}

impl HumanQuestion {
    pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

    pub fn new(task_id: Uuid, question: impl Into<String>) -> Self {
        Self {
            task_id,
            question: question.into(),
            options: None,
            timeout_seconds: Self::DEFAULT_TIMEOUT_SECONDS,
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_question_defaults_to_ten_minute_timeout() {
        let q = HumanQuestion::new(Uuid::nil(), "Delete src/legacy?");
        assert_eq!(q.timeout_seconds, 600);
        assert!(q.options.is_none());
    }

    #[test]
    fn human_question_builder_methods_compose() {
        let q = HumanQuestion::new(Uuid::nil(), "pick one")
            .with_options(vec!["a".into(), "b".into()])
            .with_timeout_seconds(30);
        assert_eq!(q.timeout_seconds, 30);
        assert_eq!(q.options, Some(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn progress_payload_round_trips() {
        let payload = ProgressPayload {
            status: "running".into(),
            step: 2,
            total: 5,
        };
        let encoded = serde_json::to_string(&payload).unwrap();
        let decoded: ProgressPayload = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.status, "running");
        assert_eq!(decoded.step, 2);
        assert_eq!(decoded.total, 5);
    }

    #[test]
    fn task_message_type_tag_uses_lowercase_key() {
        let msg = TaskMessage {
            task_id: Uuid::nil(),
            kind: MessageKind::Question,
            payload: HashMap::new(),
        };
        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(encoded["type"], "question");
    }
}
