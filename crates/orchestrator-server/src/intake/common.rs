//! Shared request-to-task construction used by both intake entry points
//! (§4.7): extract a repository URL, derive a prompt from what's left of
//! the message text, and validate both before a [`Task`] is ever built.

use orchestrator_shared::domain::{Task, TaskStatus};
use orchestrator_shared::error::ValidationError;
use orchestrator_shared::validation::{extract_repository_url, validate_prompt};
use uuid::Uuid;

/// The fields common to a mention and a slash-command invocation, before
/// either has decided how to acknowledge the caller.
#[derive(Debug, Clone)]
pub struct IntakeRequest {
    pub channel: String,
    pub thread: String,
    pub user: String,
    pub text: String,
}

/// Validates `request` and builds a fresh, `pending` [`Task`] with a random
/// id and an idempotency key defaulted to that id, per §3's Task entity.
pub fn build_task(
    request: &IntakeRequest,
    repository_host: &str,
    created_at: f64,
) -> Result<Task, ValidationError> {
    let repository_url = extract_repository_url(&request.text, repository_host)
        .ok_or(ValidationError::MissingRepositoryUrl)?;
    let prompt = strip_repository_url_and_mentions(&request.text, &repository_url);
    validate_prompt(&prompt)?;

    let id = Uuid::new_v4();
    Ok(Task {
        id,
        channel: request.channel.clone(),
        thread: request.thread.clone(),
        user: request.user.clone(),
        prompt,
        repository_url,
        status: TaskStatus::Pending,
        created_at,
        idempotency_key: id.to_string(),
    })
}

/// The prompt handed to the assistant CLI is the request text with the
/// matched repository URL and any `<@...>` mention tokens removed, since
/// those are addressing metadata rather than instructions.
fn strip_repository_url_and_mentions(text: &str, repository_url: &str) -> String {
    text.replace(repository_url, " ")
        .split_whitespace()
        .filter(|token| !token.starts_with("<@"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> IntakeRequest {
        IntakeRequest {
            channel: "C1".into(),
            thread: "1.0".into(),
            user: "U1".into(),
            text: text.to_string(),
        }
    }

    #[test]
    fn builds_a_pending_task_with_url_and_prompt_separated() {
        let task = build_task(
            &request("<@BOT> https://github.com/acme/svc please audit"),
            "github.com",
            0.0,
        )
        .unwrap();
        assert_eq!(task.repository_url, "https://github.com/acme/svc");
        assert_eq!(task.prompt, "please audit");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.idempotency_key, task.id.to_string());
    }

    #[test]
    fn rejects_text_with_no_repository_url() {
        let err = build_task(&request("please audit my code"), "github.com", 0.0).unwrap_err();
        assert!(matches!(err, ValidationError::MissingRepositoryUrl));
    }

    #[test]
    fn rejects_a_prompt_that_is_only_the_url_and_mention() {
        let err = build_task(
            &request("<@BOT> https://github.com/acme/svc"),
            "github.com",
            0.0,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::EmptyPrompt));
    }

    #[test]
    fn rejects_a_url_on_an_unexpected_host() {
        let err = build_task(
            &request("<@BOT> https://gitlab.com/acme/svc please audit"),
            "github.com",
            0.0,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::MissingRepositoryUrl));
    }
}
