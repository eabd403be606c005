//! The narrow container-platform boundary the Sandbox Manager consumes.
//! Everything about how containers are actually scheduled lives outside
//! this crate; this trait is the whole contract.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SandboxError;

/// One environment variable attached to a container group. `secure` mirrors
/// `orchestrator_shared::domain::EnvValue` without depending on it directly,
/// keeping this crate's platform boundary independent of the domain crate's
/// representation.
#[derive(Debug, Clone)]
pub struct ContainerEnvVar {
    pub name: String,
    pub value: String,
    pub secure: bool,
}

/// Everything needed to create or update one container group.
#[derive(Debug, Clone)]
pub struct ContainerGroupSpec {
    pub name: String,
    pub image: String,
    pub cpu: f64,
    pub memory_gb: f64,
    pub environment: Vec<ContainerEnvVar>,
    pub command: Option<Vec<String>>,
    pub location: String,
}

/// The provisioning state as reported by the platform, pre-normalization.
/// The Sandbox Manager maps this onto `SandboxStatus`; this crate's
/// `platform` module does not know about `SandboxStatus` at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningState {
    Pending,
    Creating,
    Running,
    Failed,
    Other(String),
}

impl ProvisioningState {
    fn from_str(raw: &str) -> Self {
        match raw {
            "Pending" => ProvisioningState::Pending,
            "Creating" => ProvisioningState::Creating,
            "Running" | "Succeeded" => ProvisioningState::Running,
            "Failed" => ProvisioningState::Failed,
            other => ProvisioningState::Other(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ContainerPlatform: Send + Sync + Debug {
    async fn create_or_update(
        &self,
        spec: ContainerGroupSpec,
    ) -> Result<ProvisioningState, SandboxError>;

    async fn delete(&self, group_name: &str) -> Result<(), SandboxError>;

    async fn get_provisioning_state(
        &self,
        group_name: &str,
    ) -> Result<ProvisioningState, SandboxError>;
}

/// Real implementation speaking a generic REST container-group API:
/// `PUT {base_url}/subscriptions/{sub}/resourceGroups/{rg}/containerGroups/{name}`
/// to create, `DELETE` the same path to destroy, `GET` to observe state.
/// The exact provider behind `base_url` is an external collaborator (see
/// the purpose-and-scope non-goals); this client only needs the shape of
/// that REST surface.
#[derive(Debug)]
pub struct HttpContainerPlatform {
    base_url: String,
    subscription_id: String,
    resource_group: String,
    location: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ContainerGroupResponse {
    #[serde(rename = "provisioningState")]
    provisioning_state: String,
}

impl HttpContainerPlatform {
    pub fn new(
        base_url: impl Into<String>,
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            location: location.into(),
            http: reqwest::Client::new(),
        }
    }

    fn group_url(&self, group_name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/containerGroups/{}",
            self.base_url, self.subscription_id, self.resource_group, group_name
        )
    }
}

#[async_trait]
impl ContainerPlatform for HttpContainerPlatform {
    async fn create_or_update(
        &self,
        spec: ContainerGroupSpec,
    ) -> Result<ProvisioningState, SandboxError> {
        let environment: Vec<serde_json::Value> = spec
            .environment
            .iter()
            .map(|e| {
                let field = if e.secure { "secureValue" } else { "value" };
                serde_json::json!({ "name": e.name, field: e.value })
            })
            .collect();

        let body = serde_json::json!({
            "location": spec.location,
            "properties": {
                "osType": "Linux",
                "restartPolicy": "Never",
                "containers": [{
                    "name": spec.name,
                    "properties": {
                        "image": spec.image,
                        "command": spec.command,
                        "environmentVariables": environment,
                        "resources": {
                            "requests": { "cpu": spec.cpu, "memoryInGB": spec.memory_gb }
                        }
                    }
                }]
            }
        });

        let response = self
            .http
            .put(self.group_url(&spec.name))
            .json(&body)
            .send()
            .await
            .map_err(|e| SandboxError::PlatformFault(e.to_string()))?;

        let parsed: ContainerGroupResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::PlatformFault(e.to_string()))?;

        Ok(ProvisioningState::from_str(&parsed.provisioning_state))
    }

    async fn delete(&self, group_name: &str) -> Result<(), SandboxError> {
        self.http
            .delete(self.group_url(group_name))
            .send()
            .await
            .map_err(|e| SandboxError::PlatformFault(e.to_string()))?;
        Ok(())
    }

    async fn get_provisioning_state(
        &self,
        group_name: &str,
    ) -> Result<ProvisioningState, SandboxError> {
        let response = self
            .http
            .get(self.group_url(group_name))
            .send()
            .await
            .map_err(|e| SandboxError::PlatformFault(e.to_string()))?;

        let parsed: ContainerGroupResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::PlatformFault(e.to_string()))?;

        Ok(ProvisioningState::from_str(&parsed.provisioning_state))
    }
}

/// In-memory fake used by tests: records created groups and lets tests
/// script exactly what state each one reports.
#[derive(Debug, Default)]
pub struct InMemoryContainerPlatform {
    groups: Mutex<HashMap<String, ProvisioningState>>,
    fail_next_create: Mutex<Option<String>>,
}

impl InMemoryContainerPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: the next `create_or_update` call fails with `reason`.
    pub fn fail_next_create(&self, reason: impl Into<String>) {
        *self.fail_next_create.lock().expect("mutex poisoned") = Some(reason.into());
    }

    pub fn set_state(&self, group_name: &str, state: ProvisioningState) {
        self.groups
            .lock()
            .expect("mutex poisoned")
            .insert(group_name.to_string(), state);
    }

    pub fn contains(&self, group_name: &str) -> bool {
        self.groups.lock().expect("mutex poisoned").contains_key(group_name)
    }
}

#[async_trait]
impl ContainerPlatform for InMemoryContainerPlatform {
    async fn create_or_update(
        &self,
        spec: ContainerGroupSpec,
    ) -> Result<ProvisioningState, SandboxError> {
        if let Some(reason) = self.fail_next_create.lock().expect("mutex poisoned").take() {
            return Err(SandboxError::PlatformFault(reason));
        }
        self.groups
            .lock()
            .expect("mutex poisoned")
            .insert(spec.name.clone(), ProvisioningState::Running);
        Ok(ProvisioningState::Running)
    }

    async fn delete(&self, group_name: &str) -> Result<(), SandboxError> {
        self.groups.lock().expect("mutex poisoned").remove(group_name);
        Ok(())
    }

    async fn get_provisioning_state(
        &self,
        group_name: &str,
    ) -> Result<ProvisioningState, SandboxError> {
        self.groups
            .lock()
            .expect("mutex poisoned")
            .get(group_name)
            .cloned()
            .ok_or_else(|| SandboxError::PlatformFault(format!("unknown group {group_name}")))
    }
}
