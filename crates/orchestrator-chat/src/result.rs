//! Posts a completed task's result artifact to its originating thread,
//! choosing between an inline message and a file upload by size.

use uuid::Uuid;

use crate::client::ChatClient;
use crate::error::ChatResult;

/// Results at or under this length are posted inline; longer ones are
/// uploaded as a file instead, so a single long result doesn't dominate
/// the thread's scrollback.
pub const INLINE_RESULT_MAX_CHARS: usize = 4000;

/// Posts `text` to `(channel, thread)` as the result of `task_id`: inline
/// via [`ChatClient::send_message`] when short enough, otherwise as an
/// uploaded file named `result-{task_id}.txt`.
pub async fn post_result(
    chat: &impl ChatClient,
    task_id: Uuid,
    channel: &str,
    thread: &str,
    text: &str,
) -> ChatResult<()> {
    if text.chars().count() <= INLINE_RESULT_MAX_CHARS {
        chat.send_message(channel, text, Some(thread)).await?;
    } else {
        let filename = format!("result-{task_id}.txt");
        chat.upload_file(channel, Some(thread), &filename, text).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryChatClient;

    #[tokio::test]
    async fn short_result_is_sent_inline() {
        let chat = InMemoryChatClient::new();
        post_result(&chat, Uuid::new_v4(), "C1", "1.0", "all good").await.unwrap();
        assert_eq!(chat.sent_messages().len(), 1);
        assert!(chat.uploaded_files().is_empty());
    }

    #[tokio::test]
    async fn exactly_at_threshold_is_still_inline() {
        let chat = InMemoryChatClient::new();
        let text = "a".repeat(INLINE_RESULT_MAX_CHARS);
        post_result(&chat, Uuid::new_v4(), "C1", "1.0", &text).await.unwrap();
        assert_eq!(chat.sent_messages().len(), 1);
        assert!(chat.uploaded_files().is_empty());
    }

    #[tokio::test]
    async fn over_threshold_result_is_uploaded_as_a_file() {
        let chat = InMemoryChatClient::new();
        let task_id = Uuid::new_v4();
        let text = "a".repeat(INLINE_RESULT_MAX_CHARS + 1);
        post_result(&chat, task_id, "C1", "1.0", &text).await.unwrap();

        assert!(chat.sent_messages().is_empty());
        let uploads = chat.uploaded_files();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].filename, format!("result-{task_id}.txt"));
    }
}
