//! Composition root for the chat-fronted sandbox orchestrator: wires the
//! Pub/Sub Client, Task Manager, Sandbox Manager, Chat Client, Progress
//! Notifier, and Question Handler together behind the two intake entry
//! points a transport adapter calls into.

pub mod error;
pub mod intake;
pub mod orchestrator;

pub use error::{OrchestratorError, OrchestratorResult};
pub use intake::{
    MentionEvent, MentionHandler, MentionOutcome, SlashCommandEvent, SlashCommandHandler,
    SlashCommandOutcome,
};
pub use orchestrator::Orchestrator;
