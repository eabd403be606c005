//! Sandbox container shape and live-handle types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An environment variable value, distinguishing secure (non-loggable)
/// entries from plain ones at the type level so a call site can't forget to
/// redact a secret by skipping a boolean check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    Plain(String),
    Secure(String),
}

impl EnvValue {
    pub fn value(&self) -> &str {
        match self {
            EnvValue::Plain(v) | EnvValue::Secure(v) => v,
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, EnvValue::Secure(_))
    }
}

impl std::fmt::Display for EnvValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvValue::Plain(v) => write!(f, "{v}"),
            EnvValue::Secure(_) => write!(f, "<redacted>"),
        }
    }
}

/// Immutable shape of a container the Sandbox Manager is asked to create.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub image: String,
    pub cpu: f64,
    pub memory_gb: f64,
    pub environment: BTreeMap<String, EnvValue>,
    pub repository_url: Option<String>,
    pub credential_token: Option<String>,
    pub prompt: Option<String>,
}

impl SandboxConfig {
    pub fn builder(image: impl Into<String>) -> SandboxConfigBuilder {
        SandboxConfigBuilder::new(image)
    }
}

/// Small builder so construction sites don't have to name every field.
#[derive(Debug, Default)]
pub struct SandboxConfigBuilder {
    image: String,
    cpu: f64,
    memory_gb: f64,
    environment: BTreeMap<String, EnvValue>,
    repository_url: Option<String>,
    credential_token: Option<String>,
    prompt: Option<String>,
}

impl SandboxConfigBuilder {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            cpu: 1.0,
            memory_gb: 2.0,
            ..Default::default()
        }
    }

    pub fn cpu(mut self, cpu: f64) -> Self {
        self.cpu = cpu;
        self
    }

    pub fn memory_gb(mut self, memory_gb: f64) -> Self {
        self.memory_gb = memory_gb;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: EnvValue) -> Self {
        self.environment.insert(key.into(), value);
        self
    }

    pub fn repository_url(mut self, url: impl Into<String>) -> Self {
        self.repository_url = Some(url.into());
        self
    }

    pub fn credential_token(mut self, token: impl Into<String>) -> Self {
        self.credential_token = Some(token.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn build(self) -> SandboxConfig {
        SandboxConfig {
            image: self.image,
            cpu: self.cpu,
            memory_gb: self.memory_gb,
            environment: self.environment,
            repository_url: self.repository_url,
            credential_token: self.credential_token,
            prompt: self.prompt,
        }
    }
}

/// Observed status of a live sandbox, as reported by the container platform.
///
/// The Sandbox Manager itself only ever writes `Creating`, `Running`,
/// `Failed`, and `Terminated` (on destroy). `Starting` and `Cloning` exist
/// for the Task Manager to mirror its own lifecycle stages onto the sandbox
/// record if a caller wants a single status to display; the Sandbox Manager
/// never sets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    Creating,
    Starting,
    Cloning,
    Running,
    Failed,
    Terminated,
}

/// A live container handle owned exclusively by the Sandbox Manager's
/// in-memory map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sandbox {
    pub task_id: Uuid,
    pub container_group_name: String,
    pub status: SandboxStatus,
    /// Epoch seconds.
    pub created_at: f64,
}

impl Sandbox {
    /// Container group name is deterministically `sandbox-` + the first 8
    /// characters of the task id's canonical dashed form.
    pub fn container_group_name(task_id: Uuid) -> String {
        let rendered = task_id.to_string();
        let short: String = rendered.chars().take(8).collect();
        format!("sandbox-{short}")
    }
}
