//! Persisted sandbox metadata.
//!
//! Every sandbox directory carries a `metadata.json` describing what was
//! built: the skill, the tool descriptors, the environment requirements, and
//! the backend handle (venv path, or container id + image identity). Cleanup
//! reads this document to recover backend handles across process restarts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use skillbox_core::{EnvironmentRequirements, Error, Result, SkillDefinition, ToolSpec};

use crate::config::{ContainerConfig, NetworkMode, ResourceLimits};

/// File name of the metadata document inside a sandbox directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Snapshot of the container configuration a sandbox was created with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfigSnapshot {
    pub base_image: String,
    pub network_mode: NetworkMode,
    pub read_only_rootfs: bool,
    pub working_dir: String,
    pub resource_limits: ResourceLimits,
}

impl From<&ContainerConfig> for ContainerConfigSnapshot {
    fn from(config: &ContainerConfig) -> Self {
        Self {
            base_image: config.base_image.clone(),
            network_mode: config.network_mode,
            read_only_rootfs: config.read_only_rootfs,
            working_dir: config.working_dir.clone(),
            resource_limits: config.resource_limits.clone(),
        }
    }
}

/// The durable record of what was built for a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxMetadata {
    pub sandbox_id: String,
    pub skill_name: String,
    pub skill_description: String,
    pub system_prompt: String,
    pub tools: Vec<ToolSpec>,
    pub environment_requirements: EnvironmentRequirements,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Directory backend: path of the provisioned virtual environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv_path: Option<PathBuf>,

    /// Container backend: container identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Container backend: image identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_config: Option<ContainerConfigSnapshot>,

    pub workspace_path: PathBuf,
    pub logs_path: PathBuf,
}

impl SandboxMetadata {
    /// Base metadata for a skill, with backend-specific fields unset.
    pub fn for_skill(skill: &SkillDefinition, sandbox_id: &str, sandbox_path: &Path) -> Self {
        Self {
            sandbox_id: sandbox_id.to_string(),
            skill_name: skill.name.clone(),
            skill_description: skill.description.clone(),
            system_prompt: skill.system_prompt.clone(),
            tools: skill.tools.clone(),
            environment_requirements: skill.environment.clone(),
            metadata: skill.metadata.clone(),
            venv_path: None,
            container_id: None,
            image_tag: None,
            container_config: None,
            workspace_path: sandbox_path.join("workspace"),
            logs_path: sandbox_path.join("logs"),
        }
    }

    /// Persist the document into the sandbox directory.
    pub async fn save(&self, sandbox_path: &Path) -> Result<()> {
        let rendered = serde_json::to_string_pretty(self)?;
        let path = sandbox_path.join(METADATA_FILE);
        tokio::fs::write(&path, rendered).await.map_err(|e| {
            Error::environment(format!(
                "Failed to write metadata {}: {}",
                path.display(),
                e
            ))
        })?;
        tracing::debug!(path = %path.display(), "Saved sandbox metadata");
        Ok(())
    }

    /// Load the document from a sandbox directory.
    pub async fn load(sandbox_path: &Path) -> Result<Self> {
        let path = sandbox_path.join(METADATA_FILE);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::environment(format!(
                "Failed to read metadata {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}
