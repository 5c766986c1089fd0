//! Sandbox lifecycle orchestration.
//!
//! The [`SandboxManager`] is the root of the subsystem: it selects an
//! isolation backend per sandbox, generates identifiers, computes the tool
//! set, owns the in-process sandbox registry, and routes tool execution to
//! either in-process tools (directory mode) or the container tool executor
//! (container mode).
//!
//! The registry is instance state, not a global: multiple managers coexist
//! without cross-contamination. Registry mutation is guarded by a lock, but
//! callers invoking operations on the *same* sandbox id concurrently must
//! serialize externally.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use skillbox_core::{Error, Result, SkillDefinition};
use skillbox_skills::ToolRegistry;

use crate::config::ContainerConfig;
use crate::container_env::ContainerEnvironmentBuilder;
use crate::environment::EnvironmentBuilder;
use crate::executor::ContainerToolExecutor;
use crate::runtime::ContainerRuntime;

/// Which backend a sandbox uses.
///
/// `Directory` is the intentionally weaker tier: tool execution runs
/// in-process, guarded by path containment only, with no resource limits.
/// `Container` delegates isolation to the container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    Directory,
    Container,
}

/// Lifecycle state of a sandbox.
///
/// The only transitions are `Active --cleanup success--> removed` and
/// `Active --cleanup failure--> Active` (retryable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Active,
    Terminated,
}

/// Backend-specific handle of a live sandbox. Never absent while the record
/// is active.
#[derive(Debug, Clone)]
enum BackendHandle {
    Directory { venv_path: Option<PathBuf> },
    Container { container_id: String, image_tag: String },
}

/// One tracked sandbox.
#[derive(Debug, Clone)]
struct SandboxRecord {
    skill: SkillDefinition,
    isolation: IsolationMode,
    sandbox_path: PathBuf,
    workspace_path: PathBuf,
    status: SandboxStatus,
    backend: BackendHandle,
    tools: Vec<String>,
}

/// Public view of a sandbox record.
#[derive(Debug, Clone, Serialize)]
pub struct SandboxInfo {
    pub sandbox_id: String,
    pub skill_name: String,
    pub skill_description: String,
    pub isolation_mode: IsolationMode,
    pub sandbox_path: PathBuf,
    pub workspace_path: PathBuf,
    pub status: SandboxStatus,
    pub tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venv_path: Option<PathBuf>,
}

/// Creates, tracks, executes into, and cleans up sandboxes.
pub struct SandboxManager {
    base_path: PathBuf,
    isolation_mode: IsolationMode,
    registry: ToolRegistry,
    environments: EnvironmentBuilder,
    container_environments: Option<ContainerEnvironmentBuilder>,
    container_executor: Option<ContainerToolExecutor>,
    default_container_config: ContainerConfig,
    sandboxes: RwLock<HashMap<String, SandboxRecord>>,
}

impl SandboxManager {
    /// Manager using the directory backend.
    pub fn directory(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        tracing::info!(base_path = %base_path.display(), "Sandbox manager using directory isolation");
        Self {
            environments: EnvironmentBuilder::new(base_path.clone()),
            base_path,
            isolation_mode: IsolationMode::Directory,
            registry: ToolRegistry::new(),
            container_environments: None,
            container_executor: None,
            default_container_config: ContainerConfig::default(),
            sandboxes: RwLock::new(HashMap::new()),
        }
    }

    /// Manager using the container backend on the given runtime.
    ///
    /// The default container configuration is validated here, before any
    /// sandbox is created.
    pub fn container(
        base_path: impl Into<PathBuf>,
        runtime: Arc<dyn ContainerRuntime>,
        default_container_config: ContainerConfig,
    ) -> Result<Self> {
        default_container_config.validate()?;

        let base_path = base_path.into();
        let container_environments =
            ContainerEnvironmentBuilder::new(runtime, base_path.clone());
        let container_executor =
            ContainerToolExecutor::new(container_environments.containers().clone());

        tracing::info!(base_path = %base_path.display(), "Sandbox manager using container isolation");
        Ok(Self {
            environments: EnvironmentBuilder::new(base_path.clone()),
            base_path,
            isolation_mode: IsolationMode::Container,
            registry: ToolRegistry::new(),
            container_environments: Some(container_environments),
            container_executor: Some(container_executor),
            default_container_config,
            sandboxes: RwLock::new(HashMap::new()),
        })
    }

    /// Replace the tool registry (must happen before sandboxes are created).
    pub fn with_tool_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn isolation_mode(&self) -> IsolationMode {
        self.isolation_mode
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    pub fn tool_registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Create a new sandbox from a skill definition. Returns the fresh
    /// sandbox id.
    ///
    /// On any failure during construction the backend's rollback has already
    /// run and no record is retained.
    pub async fn create_sandbox(
        &self,
        skill: &SkillDefinition,
        container_config: Option<&ContainerConfig>,
    ) -> Result<String> {
        let sandbox_id = uuid::Uuid::new_v4().to_string();

        let record = match self.isolation_mode {
            IsolationMode::Container => {
                let config = container_config.unwrap_or(&self.default_container_config);
                let environments = self
                    .container_environments
                    .as_ref()
                    .ok_or_else(|| Error::internal("container environment builder not initialized"))?;

                let info = environments
                    .create_environment(skill, &sandbox_id, config)
                    .await
                    .map_err(|e| {
                        Error::environment(format!(
                            "Failed to create sandbox for skill '{}': {}",
                            skill.name, e
                        ))
                    })?;

                SandboxRecord {
                    skill: skill.clone(),
                    isolation: IsolationMode::Container,
                    sandbox_path: self.base_path.join(&sandbox_id),
                    workspace_path: info.workspace_path,
                    status: SandboxStatus::Active,
                    backend: BackendHandle::Container {
                        container_id: info.container_id,
                        image_tag: info.image_tag,
                    },
                    tools: self.container_tool_set(skill),
                }
            }
            IsolationMode::Directory => {
                let sandbox_path = self
                    .environments
                    .create_environment(skill, &sandbox_id)
                    .await
                    .map_err(|e| {
                        Error::environment(format!(
                            "Failed to create sandbox for skill '{}': {}",
                            skill.name, e
                        ))
                    })?;

                let venv_path = sandbox_path.join("venv");
                SandboxRecord {
                    skill: skill.clone(),
                    isolation: IsolationMode::Directory,
                    workspace_path: sandbox_path.join("workspace"),
                    status: SandboxStatus::Active,
                    backend: BackendHandle::Directory {
                        venv_path: venv_path.exists().then_some(venv_path),
                    },
                    tools: self.directory_tool_set(skill),
                    sandbox_path,
                }
            }
        };

        self.sandboxes
            .write()
            .await
            .insert(sandbox_id.clone(), record);
        tracing::info!(sandbox_id = %sandbox_id, skill = %skill.name, "Created sandbox");
        Ok(sandbox_id)
    }

    /// Tool set for directory mode: skill-declared tools that exist in the
    /// registry, plus the registry's default tools.
    fn directory_tool_set(&self, skill: &SkillDefinition) -> Vec<String> {
        let mut tools = Vec::new();
        for name in skill.tool_names() {
            if !self.registry.has_tool(&name) {
                tracing::debug!(tool = %name, "Skill-declared tool not in registry, skipping");
                continue;
            }
            if !tools.contains(&name) {
                tools.push(name);
            }
        }
        for name in self.registry.list_tools() {
            if !tools.contains(&name) {
                tools.push(name);
            }
        }
        tools
    }

    /// Tool set for container mode: everything the skill declares plus the
    /// registry defaults; availability is checked by the executor at call
    /// time.
    fn container_tool_set(&self, skill: &SkillDefinition) -> Vec<String> {
        let mut tools = Vec::new();
        for name in skill.tool_names() {
            if !tools.contains(&name) {
                tools.push(name);
            }
        }
        for name in self.registry.list_tools() {
            if !tools.contains(&name) {
                tools.push(name);
            }
        }
        tools
    }

    /// Information about a sandbox, or `None` if the id is unknown.
    pub async fn get_sandbox(&self, sandbox_id: &str) -> Option<SandboxInfo> {
        let sandboxes = self.sandboxes.read().await;
        let record = sandboxes.get(sandbox_id)?;

        let (container_id, image_tag, venv_path) = match &record.backend {
            BackendHandle::Container {
                container_id,
                image_tag,
            } => (Some(container_id.clone()), Some(image_tag.clone()), None),
            BackendHandle::Directory { venv_path } => (None, None, venv_path.clone()),
        };

        Some(SandboxInfo {
            sandbox_id: sandbox_id.to_string(),
            skill_name: record.skill.name.clone(),
            skill_description: record.skill.description.clone(),
            isolation_mode: record.isolation,
            sandbox_path: record.sandbox_path.clone(),
            workspace_path: record.workspace_path.clone(),
            status: record.status,
            tools: record.tools.clone(),
            container_id,
            image_tag,
            venv_path,
        })
    }

    /// Execute a tool within a sandbox and return its result value.
    pub async fn execute_tool(
        &self,
        sandbox_id: &str,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        // Resolve routing data under the lock, then release it for the
        // blocking backend call
        let (isolation, workspace_path, container_id) = {
            let sandboxes = self.sandboxes.read().await;
            let record = sandboxes
                .get(sandbox_id)
                .ok_or_else(|| Error::SandboxNotFound(sandbox_id.to_string()))?;

            if record.status != SandboxStatus::Active {
                return Err(Error::invalid_input(format!(
                    "Sandbox {} is not active",
                    sandbox_id
                )));
            }
            if !record.tools.iter().any(|t| t == tool_name) {
                return Err(Error::tool_not_found(format!(
                    "{} (available in sandbox {}: {})",
                    tool_name,
                    sandbox_id,
                    record.tools.join(", ")
                )));
            }

            let container_id = match &record.backend {
                BackendHandle::Container { container_id, .. } => Some(container_id.clone()),
                BackendHandle::Directory { .. } => None,
            };
            (record.isolation, record.workspace_path.clone(), container_id)
        };

        match isolation {
            IsolationMode::Container => {
                let executor = self
                    .container_executor
                    .as_ref()
                    .ok_or_else(|| Error::internal("container executor not initialized"))?;
                let container_id = container_id
                    .ok_or_else(|| Error::internal("container handle missing for active sandbox"))?;
                executor
                    .execute(&container_id, tool_name, args, None)
                    .await
            }
            IsolationMode::Directory => {
                let tool = self
                    .registry
                    .instantiate(tool_name, &workspace_path)
                    .ok_or_else(|| Error::tool_not_found(tool_name))?;
                tool.execute(args).await
            }
        }
    }

    /// Names of the tools available in a sandbox.
    pub async fn list_tools(&self, sandbox_id: &str) -> Result<Vec<String>> {
        let sandboxes = self.sandboxes.read().await;
        sandboxes
            .get(sandbox_id)
            .map(|record| record.tools.clone())
            .ok_or_else(|| Error::SandboxNotFound(sandbox_id.to_string()))
    }

    /// Ids of all tracked sandboxes.
    pub async fn sandbox_ids(&self) -> Vec<String> {
        self.sandboxes.read().await.keys().cloned().collect()
    }

    /// Clean up a sandbox: tear down its backend and drop its record.
    ///
    /// Idempotent: returns `Ok(false)` if the id is unknown. On backend
    /// failure the record is restored so a second attempt remains possible.
    pub async fn cleanup_sandbox(&self, sandbox_id: &str) -> Result<bool> {
        let record = {
            let mut sandboxes = self.sandboxes.write().await;
            match sandboxes.remove(sandbox_id) {
                Some(record) => record,
                None => return Ok(false),
            }
        };

        let result = match record.isolation {
            IsolationMode::Container => match &self.container_environments {
                Some(environments) => environments.cleanup(sandbox_id, false).await.map(|_| ()),
                None => Err(Error::internal(
                    "container environment builder not initialized",
                )),
            },
            IsolationMode::Directory => {
                self.environments.cleanup(sandbox_id).await.map(|_| ())
            }
        };

        match result {
            Ok(()) => {
                tracing::info!(sandbox_id = %sandbox_id, "Cleaned up sandbox");
                Ok(true)
            }
            Err(e) => {
                // Restore the record so cleanup can be retried
                self.sandboxes
                    .write()
                    .await
                    .insert(sandbox_id.to_string(), record);
                Err(Error::environment(format!(
                    "Failed to cleanup sandbox {}: {}",
                    sandbox_id, e
                )))
            }
        }
    }

    /// Clean up every tracked sandbox, tolerating individual failures.
    /// Returns the number of sandboxes removed.
    pub async fn cleanup_all(&self) -> usize {
        let ids = self.sandbox_ids().await;
        let mut cleaned = 0;
        for sandbox_id in ids {
            match self.cleanup_sandbox(&sandbox_id).await {
                Ok(true) => cleaned += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(sandbox_id = %sandbox_id, "Cleanup failed: {}", e);
                }
            }
        }
        cleaned
    }
}
