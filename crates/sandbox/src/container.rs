//! Container lifecycle management.
//!
//! Owns container create/start/stop/remove/exec against the runtime
//! boundary, translating a validated [`ContainerConfig`] into a
//! runtime-neutral [`ContainerSpec`]. Containers belonging to sandboxes are
//! named `sandbox-<sandbox_id>` so bulk cleanup can find them later.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use skillbox_core::{Error, Result};

use crate::config::ContainerConfig;
use crate::runtime::{
    ContainerDescriptor, ContainerRuntime, ContainerSpec, ExecOutput, VolumeBind,
};

/// Name prefix tying containers to sandboxes.
pub const CONTAINER_NAME_PREFIX: &str = "sandbox-";

/// Grace period for ordinary stops.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);
/// Shorter grace period during bulk cleanup sweeps.
const SWEEP_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Manages container lifecycle for sandbox isolation.
pub struct ContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    base_path: PathBuf,
}

impl ContainerManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            base_path: base_path.into(),
        }
    }

    /// The runtime boundary this manager drives.
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Conventional container name for a sandbox.
    pub fn container_name(sandbox_id: &str) -> String {
        format!("{}{}", CONTAINER_NAME_PREFIX, sandbox_id)
    }

    /// Create a container for a sandbox from a built image.
    ///
    /// Binds the sandbox workspace directory read-write into the container's
    /// working directory and merges any extra volumes from the config. The
    /// container is created stopped; call [`ContainerManager::start`].
    pub async fn create(
        &self,
        sandbox_id: &str,
        image_tag: &str,
        config: &ContainerConfig,
    ) -> Result<String> {
        if sandbox_id.trim().is_empty() {
            return Err(Error::invalid_input("sandbox_id cannot be empty"));
        }
        if image_tag.trim().is_empty() {
            return Err(Error::invalid_input("image_tag cannot be empty"));
        }
        config.validate()?;

        let workspace_path = self.base_path.join(sandbox_id).join("workspace");
        tokio::fs::create_dir_all(&workspace_path)
            .await
            .map_err(|e| {
                Error::environment(format!(
                    "Failed to create workspace {}: {}",
                    workspace_path.display(),
                    e
                ))
            })?;

        let mut binds = vec![VolumeBind {
            host_path: workspace_path.display().to_string(),
            container_path: config.working_dir.clone(),
            read_only: false,
        }];
        binds.extend(config.volumes.iter().cloned());

        let mut env: Vec<String> = config
            .environment_vars
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        env.sort();

        let spec = ContainerSpec {
            image: image_tag.to_string(),
            name: Self::container_name(sandbox_id),
            working_dir: config.working_dir.clone(),
            command: Vec::new(),
            binds,
            network_mode: config.network_mode.as_str().to_string(),
            read_only_rootfs: config.read_only_rootfs,
            tmpfs: config.tmpfs.clone(),
            env,
            labels: [
                ("managed-by".to_string(), "skillbox-sandbox".to_string()),
                ("skillbox.sandbox-id".to_string(), sandbox_id.to_string()),
            ]
            .into_iter()
            .collect(),
            memory_bytes: config
                .resource_limits
                .memory_bytes()?
                .map(|bytes| bytes as i64),
            cpu_quota: config.resource_limits.cpu_quota().map(|(quota, _)| quota),
            cpu_period: config.resource_limits.cpu_quota().map(|(_, period)| period),
            pids_limit: config.resource_limits.pids_limit,
            ulimits: config.resource_limits.ulimits.clone(),
            user: config.user.clone(),
            cap_add: config.cap_add.clone(),
            cap_drop: config.cap_drop.clone(),
            security_opt: config.security_opt.clone(),
        };

        let container_id = self.runtime.create_container(&spec).await?;
        tracing::info!(
            container_id = %container_id,
            sandbox_id = %sandbox_id,
            image = %image_tag,
            "Created container"
        );
        Ok(container_id)
    }

    pub async fn start(&self, container_id: &str) -> Result<()> {
        if container_id.trim().is_empty() {
            return Err(Error::invalid_input("container_id cannot be empty"));
        }
        self.runtime.start_container(container_id).await?;
        tracing::info!(container_id = %container_id, "Started container");
        Ok(())
    }

    /// Stop a container with a grace period (default 10 s).
    pub async fn stop(&self, container_id: &str, timeout: Option<Duration>) -> Result<()> {
        if container_id.trim().is_empty() {
            return Err(Error::invalid_input("container_id cannot be empty"));
        }
        self.runtime
            .stop_container(container_id, timeout.unwrap_or(STOP_TIMEOUT))
            .await?;
        tracing::info!(container_id = %container_id, "Stopped container");
        Ok(())
    }

    /// Terminate a container immediately.
    pub async fn kill(&self, container_id: &str) -> Result<()> {
        if container_id.trim().is_empty() {
            return Err(Error::invalid_input("container_id cannot be empty"));
        }
        self.runtime.kill_container(container_id).await?;
        tracing::info!(container_id = %container_id, "Killed container");
        Ok(())
    }

    /// Remove a container. Removing an already-absent container is not an
    /// error: teardown is idempotent.
    pub async fn remove(&self, container_id: &str, force: bool) -> Result<()> {
        if container_id.trim().is_empty() {
            return Err(Error::invalid_input("container_id cannot be empty"));
        }
        match self.runtime.remove_container(container_id, force).await {
            Ok(()) => {
                tracing::info!(container_id = %container_id, "Removed container");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(container_id = %container_id, "Container already removed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Execute a command (argv form) in a running container.
    ///
    /// The target must be running; executing against a stopped container is
    /// a precondition failure, not silently skipped.
    pub async fn exec(
        &self,
        container_id: &str,
        command: &[String],
        timeout: Duration,
    ) -> Result<ExecOutput> {
        if container_id.trim().is_empty() {
            return Err(Error::invalid_input("container_id cannot be empty"));
        }
        if command.is_empty() {
            return Err(Error::invalid_input("command cannot be empty"));
        }

        let descriptor = self.runtime.inspect_container(container_id).await?;
        if !descriptor.running {
            return Err(Error::runtime(format!(
                "Container {} is not running (status: {})",
                container_id, descriptor.status
            )));
        }

        let output = self.runtime.exec(container_id, command, timeout).await?;
        tracing::debug!(
            container_id = %container_id,
            exit_code = output.exit_code,
            "Executed command in container"
        );
        Ok(output)
    }

    /// Describe an existing container.
    pub async fn info(&self, container_id: &str) -> Result<ContainerDescriptor> {
        if container_id.trim().is_empty() {
            return Err(Error::invalid_input("container_id cannot be empty"));
        }
        self.runtime.inspect_container(container_id).await
    }

    /// List sandbox container ids, optionally restricted to one sandbox.
    pub async fn list(&self, sandbox_id: Option<&str>, all: bool) -> Result<Vec<String>> {
        let prefix = match sandbox_id {
            Some(id) => Self::container_name(id),
            None => CONTAINER_NAME_PREFIX.to_string(),
        };

        let containers = self.runtime.list_containers(all).await?;
        Ok(containers
            .into_iter()
            .filter(|c| c.name.starts_with(&prefix))
            .map(|c| c.id)
            .collect())
    }

    /// Bulk cleanup sweep: stop then force-remove every sandbox container
    /// (optionally restricted to one sandbox), tolerating individual
    /// failures. Returns the number of containers removed.
    pub async fn cleanup_containers(&self, sandbox_id: Option<&str>) -> usize {
        let containers = match self.list(sandbox_id, true).await {
            Ok(containers) => containers,
            Err(e) => {
                tracing::error!("Failed to list containers for cleanup: {}", e);
                return 0;
            }
        };

        let mut cleaned = 0;
        for container_id in containers {
            if let Err(e) = self
                .runtime
                .stop_container(&container_id, SWEEP_STOP_TIMEOUT)
                .await
            {
                if !e.is_not_found() {
                    tracing::debug!(container_id = %container_id, "Stop during sweep failed: {}", e);
                }
            }
            match self.remove(&container_id, true).await {
                Ok(()) => cleaned += 1,
                Err(e) => {
                    tracing::warn!(container_id = %container_id, "Failed to cleanup container: {}", e);
                }
            }
        }

        tracing::info!(count = cleaned, "Container cleanup sweep finished");
        cleaned
    }
}
