//! Domain model shared across every orchestrator component.

mod message;
mod sandbox;
mod task;

pub use message::{HumanQuestion, MessageKind, ProgressPayload, TaskMessage};
pub use sandbox::{EnvValue, Sandbox, SandboxConfig, SandboxConfigBuilder, SandboxStatus};
pub use task::{Task, TaskStatus};
