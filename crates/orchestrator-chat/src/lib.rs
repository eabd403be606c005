//! Chat-platform boundary, progress notification, and human-in-the-loop
//! question handling.

pub mod client;
pub mod error;
pub mod progress;
pub mod question;
pub mod result;

pub use client::{ChatClient, HttpChatClient, InMemoryChatClient};
pub use error::{ChatError, ChatResult};
pub use progress::ProgressNotifier;
pub use question::{QuestionHandler, QuestionHandlerConfig};
pub use result::{post_result, INLINE_RESULT_MAX_CHARS};
