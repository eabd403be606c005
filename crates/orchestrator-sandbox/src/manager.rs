//! Creates, destroys, and reports on sandbox containers, mapping the
//! container platform's provisioning state onto `SandboxStatus` and
//! guarding every platform call with a circuit breaker.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use orchestrator_shared::domain::{EnvValue, Sandbox, SandboxConfig, SandboxStatus};
use orchestrator_shared::resilience::{CircuitBreaker, CircuitBreakerBehavior, CircuitBreakerConfig};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::command::build_command;
use crate::error::{SandboxError, SandboxResult};
use crate::platform::{ContainerEnvVar, ContainerGroupSpec, ContainerPlatform, ProvisioningState};

fn epoch_seconds_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn map_provisioning_state(state: &ProvisioningState) -> SandboxStatus {
    match state {
        ProvisioningState::Failed => SandboxStatus::Failed,
        ProvisioningState::Creating | ProvisioningState::Pending => SandboxStatus::Creating,
        ProvisioningState::Running | ProvisioningState::Other(_) => SandboxStatus::Running,
    }
}

fn build_environment(config: &SandboxConfig, task_id: Uuid) -> Vec<ContainerEnvVar> {
    // Every entry from the caller-supplied base map is attached as secure,
    // regardless of whether it was built as `EnvValue::Plain` or `Secure` —
    // §4.2 treats the whole base map as non-loggable. Only the variables
    // this function adds itself get to choose their own visibility.
    let mut env: Vec<ContainerEnvVar> = config
        .environment
        .iter()
        .map(|(name, value)| ContainerEnvVar {
            name: name.clone(),
            value: value.value().to_string(),
            secure: true,
        })
        .collect();

    if let Some(url) = &config.repository_url {
        env.push(ContainerEnvVar {
            name: "REPOSITORY_URL".to_string(),
            value: url.clone(),
            secure: false,
        });
    }
    if let Some(token) = &config.credential_token {
        env.push(ContainerEnvVar {
            name: "CREDENTIAL_TOKEN".to_string(),
            value: token.clone(),
            secure: true,
        });
    }
    if let Some(prompt) = &config.prompt {
        env.push(ContainerEnvVar {
            name: "PROMPT".to_string(),
            value: prompt.clone(),
            secure: false,
        });
    }
    if config.repository_url.is_some() || config.credential_token.is_some() {
        env.push(ContainerEnvVar {
            name: "TASK_ID".to_string(),
            value: task_id.to_string(),
            secure: false,
        });
    }

    env
}

#[derive(Debug)]
pub struct SandboxManager {
    platform: Arc<dyn ContainerPlatform>,
    breaker: CircuitBreaker,
    location: String,
    sandboxes: Mutex<HashMap<Uuid, Sandbox>>,
}

impl SandboxManager {
    pub fn new(platform: Arc<dyn ContainerPlatform>, location: impl Into<String>) -> Self {
        Self::with_breaker_config(platform, location, CircuitBreakerConfig::default())
    }

    pub fn with_breaker_config(
        platform: Arc<dyn ContainerPlatform>,
        location: impl Into<String>,
        breaker_config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            platform,
            breaker: CircuitBreaker::new("container-platform", breaker_config),
            location: location.into(),
            sandboxes: Mutex::new(HashMap::new()),
        }
    }

    #[instrument(skip(self, config))]
    pub async fn create(&self, task_id: Uuid, config: SandboxConfig) -> SandboxResult<Sandbox> {
        if !self.breaker.should_allow() {
            return Err(SandboxError::CircuitOpen);
        }

        let group_name = Sandbox::container_group_name(task_id);
        let spec = ContainerGroupSpec {
            name: group_name.clone(),
            image: config.image.clone(),
            cpu: config.cpu,
            memory_gb: config.memory_gb,
            environment: build_environment(&config, task_id),
            command: build_command(config.repository_url.as_deref()),
            location: self.location.clone(),
        };

        let outcome = self.platform.create_or_update(spec).await;
        let state = match outcome {
            Ok(state) => {
                self.breaker.record_success();
                state
            }
            Err(err) => {
                self.breaker.record_failure();
                return Err(SandboxError::SandboxCreationError {
                    task_id,
                    reason: err.to_string(),
                });
            }
        };

        let sandbox = Sandbox {
            task_id,
            container_group_name: group_name,
            status: map_provisioning_state(&state),
            created_at: epoch_seconds_now(),
        };

        info!(task_id = %task_id, status = ?sandbox.status, "sandbox created");
        self.sandboxes
            .lock()
            .expect("mutex poisoned")
            .insert(task_id, sandbox.clone());
        Ok(sandbox)
    }

    /// Best-effort destroy: a platform failure (or an open circuit) is
    /// logged, never propagated. The record is removed from our own map
    /// regardless, since by the time destroy is called the caller has
    /// already decided the sandbox is done and an orphaned in-memory entry
    /// would only confuse later lookups.
    #[instrument(skip(self))]
    pub async fn destroy(&self, task_id: Uuid) -> SandboxResult<()> {
        let group_name = self
            .sandboxes
            .lock()
            .expect("mutex poisoned")
            .get(&task_id)
            .map(|s| s.container_group_name.clone())
            .unwrap_or_else(|| Sandbox::container_group_name(task_id));

        if !self.breaker.should_allow() {
            warn!(task_id = %task_id, "skipping destroy, circuit open");
            self.sandboxes.lock().expect("mutex poisoned").remove(&task_id);
            return Ok(());
        }

        match self.platform.delete(&group_name).await {
            Ok(()) => self.breaker.record_success(),
            Err(err) => {
                self.breaker.record_failure();
                warn!(task_id = %task_id, error = %err, "destroy failed, discarding record anyway");
            }
        }

        self.sandboxes.lock().expect("mutex poisoned").remove(&task_id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_status(&self, task_id: Uuid) -> SandboxResult<SandboxStatus> {
        let group_name = {
            let sandboxes = self.sandboxes.lock().expect("mutex poisoned");
            sandboxes
                .get(&task_id)
                .map(|s| s.container_group_name.clone())
                .ok_or(SandboxError::NotFound(task_id))?
        };

        if !self.breaker.should_allow() {
            return Err(SandboxError::CircuitOpen);
        }

        let state = match self.platform.get_provisioning_state(&group_name).await {
            Ok(state) => {
                self.breaker.record_success();
                state
            }
            Err(err) => {
                self.breaker.record_failure();
                return Err(err);
            }
        };

        let status = map_provisioning_state(&state);
        if let Some(sandbox) = self.sandboxes.lock().expect("mutex poisoned").get_mut(&task_id) {
            sandbox.status = status;
        }
        Ok(status)
    }

    pub fn breaker_metrics(&self) -> orchestrator_shared::resilience::CircuitBreakerMetrics {
        self.breaker.metrics()
    }
}
