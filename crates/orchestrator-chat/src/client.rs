//! The narrow chat-platform boundary the Progress Notifier and Question
//! Handler consume. Everything about how messages actually reach a user
//! lives outside this crate; this trait is the whole contract.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::ChatError;

#[async_trait]
pub trait ChatClient: Send + Sync + Debug {
    /// Posts a new message, optionally as a thread reply, returning the
    /// platform-assigned message timestamp used to address it later.
    async fn send_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String, ChatError>;

    /// Edits an existing message in place. Progress updates use this
    /// exclusively — never `send_message` — so a task's progress occupies
    /// one message in the thread rather than a scrolling stream of them.
    async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<(), ChatError>;

    /// Uploads `content` as a file attachment named `filename`, optionally
    /// as a thread reply. Used by result posting when the artifact text
    /// exceeds the inline message size threshold.
    async fn upload_file(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        filename: &str,
        content: &str,
    ) -> Result<(), ChatError>;

    /// Posts `text` to a slash command's own `response_url`, rather than to
    /// a channel/thread address. This is the immediate-acknowledgement path
    /// §4.7 requires for slash commands in place of a thread post.
    async fn respond_to_command(&self, response_url: &str, text: &str) -> Result<(), ChatError>;
}

/// Real implementation speaking a generic chat-platform REST API: a bot
/// token bearer-authenticates POSTs to `{base_url}/chat.postMessage`,
/// `{base_url}/chat.update`, and `{base_url}/files.upload`.
#[derive(Debug)]
pub struct HttpChatClient {
    base_url: String,
    bot_token: SecretString,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    ts: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlainResponse {
    ok: bool,
    error: Option<String>,
}

impl HttpChatClient {
    pub fn new(base_url: impl Into<String>, bot_token: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            bot_token,
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(self.bot_token.expose_secret())
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn send_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String, ChatError> {
        let mut body = serde_json::json!({ "channel": channel, "text": text });
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = serde_json::Value::String(thread_ts.to_string());
        }

        let response: PostMessageResponse = self
            .authorized(self.http.post(self.endpoint("chat.postMessage")))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::PlatformFault(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChatError::PlatformFault(e.to_string()))?;

        if !response.ok {
            return Err(ChatError::PlatformFault(
                response.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        response
            .ts
            .ok_or_else(|| ChatError::PlatformFault("response missing ts".into()))
    }

    async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<(), ChatError> {
        let body = serde_json::json!({ "channel": channel, "ts": ts, "text": text });

        let response: PlainResponse = self
            .authorized(self.http.post(self.endpoint("chat.update")))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::PlatformFault(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChatError::PlatformFault(e.to_string()))?;

        if !response.ok {
            return Err(ChatError::PlatformFault(
                response.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        filename: &str,
        content: &str,
    ) -> Result<(), ChatError> {
        let mut body = serde_json::json!({
            "channels": channel,
            "filename": filename,
            "content": content,
        });
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = serde_json::Value::String(thread_ts.to_string());
        }

        let response: PlainResponse = self
            .authorized(self.http.post(self.endpoint("files.upload")))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::PlatformFault(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChatError::PlatformFault(e.to_string()))?;

        if !response.ok {
            return Err(ChatError::PlatformFault(
                response.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(())
    }

    async fn respond_to_command(&self, response_url: &str, text: &str) -> Result<(), ChatError> {
        let body = serde_json::json!({ "text": text });
        self.http
            .post(response_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::PlatformFault(e.to_string()))?;
        Ok(())
    }
}

/// Lets the composition root share one chat client across `ProgressNotifier`
/// and `QuestionHandler` — both are generic over `C: ChatClient` rather than
/// over a trait object, so a single `Arc<dyn ChatClient>` needs to satisfy
/// the bound itself.
#[async_trait]
impl ChatClient for Arc<dyn ChatClient> {
    async fn send_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String, ChatError> {
        (**self).send_message(channel, text, thread_ts).await
    }

    async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<(), ChatError> {
        (**self).update_message(channel, ts, text).await
    }

    async fn upload_file(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        filename: &str,
        content: &str,
    ) -> Result<(), ChatError> {
        (**self).upload_file(channel, thread_ts, filename, content).await
    }

    async fn respond_to_command(&self, response_url: &str, text: &str) -> Result<(), ChatError> {
        (**self).respond_to_command(response_url, text).await
    }
}

/// In-memory fake used by tests: records every call and lets tests script
/// a fixed sequence of returned message timestamps.
#[derive(Debug, Default)]
pub struct InMemoryChatClient {
    sent: Mutex<Vec<SentMessage>>,
    updates: Mutex<Vec<UpdatedMessage>>,
    uploads: Mutex<Vec<UploadedFile>>,
    command_responses: Mutex<Vec<CommandResponse>>,
    next_ts: Mutex<u64>,
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub response_url: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel: String,
    pub text: String,
    pub thread_ts: Option<String>,
    pub ts: String,
}

#[derive(Debug, Clone)]
pub struct UpdatedMessage {
    pub channel: String,
    pub ts: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub channel: String,
    pub thread_ts: Option<String>,
    pub filename: String,
    pub content: String,
}

impl InMemoryChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("mutex poisoned").clone()
    }

    pub fn updated_messages(&self) -> Vec<UpdatedMessage> {
        self.updates.lock().expect("mutex poisoned").clone()
    }

    pub fn uploaded_files(&self) -> Vec<UploadedFile> {
        self.uploads.lock().expect("mutex poisoned").clone()
    }

    pub fn command_responses(&self) -> Vec<CommandResponse> {
        self.command_responses.lock().expect("mutex poisoned").clone()
    }

    pub fn latest_text_for(&self, channel: &str, ts: &str) -> Option<String> {
        self.updates
            .lock()
            .expect("mutex poisoned")
            .iter()
            .rev()
            .find(|u| u.channel == channel && u.ts == ts)
            .map(|u| u.text.clone())
    }
}

#[async_trait]
impl ChatClient for InMemoryChatClient {
    async fn send_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String, ChatError> {
        let ts = {
            let mut next = self.next_ts.lock().expect("mutex poisoned");
            *next += 1;
            format!("{}.000", *next)
        };
        self.sent.lock().expect("mutex poisoned").push(SentMessage {
            channel: channel.to_string(),
            text: text.to_string(),
            thread_ts: thread_ts.map(str::to_string),
            ts: ts.clone(),
        });
        Ok(ts)
    }

    async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<(), ChatError> {
        self.updates.lock().expect("mutex poisoned").push(UpdatedMessage {
            channel: channel.to_string(),
            ts: ts.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn upload_file(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        filename: &str,
        content: &str,
    ) -> Result<(), ChatError> {
        self.uploads.lock().expect("mutex poisoned").push(UploadedFile {
            channel: channel.to_string(),
            thread_ts: thread_ts.map(str::to_string),
            filename: filename.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn respond_to_command(&self, response_url: &str, text: &str) -> Result<(), ChatError> {
        self.command_responses
            .lock()
            .expect("mutex poisoned")
            .push(CommandResponse {
                response_url: response_url.to_string(),
                text: text.to_string(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_message_assigns_increasing_timestamps() {
        let client = InMemoryChatClient::new();
        let first = client.send_message("C1", "hello", None).await.unwrap();
        let second = client.send_message("C1", "again", Some(&first)).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(client.sent_messages().len(), 2);
    }

    #[tokio::test]
    async fn update_message_is_recorded_and_queryable() {
        let client = InMemoryChatClient::new();
        let ts = client.send_message("C1", "starting", None).await.unwrap();
        client.update_message("C1", &ts, "50%").await.unwrap();
        assert_eq!(client.latest_text_for("C1", &ts).as_deref(), Some("50%"));
    }

    #[tokio::test]
    async fn respond_to_command_is_recorded_against_the_response_url() {
        let client = InMemoryChatClient::new();
        client
            .respond_to_command("https://example.com/respond", "起動中... (task id: x)")
            .await
            .unwrap();
        let responses = client.command_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].response_url, "https://example.com/respond");
        assert!(client.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn upload_file_is_recorded() {
        let client = InMemoryChatClient::new();
        client
            .upload_file("C1", Some("1.0"), "result-x.txt", "the result")
            .await
            .unwrap();
        let uploads = client.uploaded_files();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].filename, "result-x.txt");
    }
}
