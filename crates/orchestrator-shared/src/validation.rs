//! Stand-alone validation helpers shared by intake, configuration loading,
//! and the domain types. Kept as plain functions (rather than a derive-based
//! validation framework) so each call site controls exactly which checks
//! apply and in what order.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::ValidationError;

static REPOSITORY_URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https://[^\s]+").expect("static pattern is valid"));

/// Validates that `url` is an `https://` URL whose host matches
/// `expected_host` exactly (e.g. `github.com`).
pub fn validate_repository_url(url: &str, expected_host: &str) -> Result<(), ValidationError> {
    let parsed = Url::parse(url)
        .map_err(|_| ValidationError::UnacceptedRepositoryHost(url.to_string()))?;

    if parsed.scheme() != "https" {
        return Err(ValidationError::UnacceptedRepositoryHost(url.to_string()));
    }

    match parsed.host_str() {
        Some(host) if host.eq_ignore_ascii_case(expected_host) => Ok(()),
        _ => Err(ValidationError::UnacceptedRepositoryHost(url.to_string())),
    }
}

/// Extracts the first HTTPS URL matching `expected_host` from free-form
/// message text, per the mention/slash-command intake contract.
pub fn extract_repository_url(text: &str, expected_host: &str) -> Option<String> {
    REPOSITORY_URL_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(|c: char| {
            c == '>' || c == ')' || c == ',' || c == '.' || c.is_whitespace()
        }))
        .find(|candidate| validate_repository_url(candidate, expected_host).is_ok())
        .map(str::to_string)
}

pub fn validate_prompt(prompt: &str) -> Result<(), ValidationError> {
    if prompt.trim().is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    Ok(())
}

pub fn validate_idempotency_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::EmptyIdempotencyKey);
    }
    Ok(())
}

/// A sandbox container name is derived from the first 8 characters of a task
/// id; this requires the id to have at least that many leading characters.
pub fn validate_task_id_length(task_id: &str) -> Result<(), ValidationError> {
    if task_id.chars().count() < 8 {
        return Err(ValidationError::TaskIdTooShort(task_id.to_string()));
    }
    Ok(())
}
