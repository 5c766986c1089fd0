//! Public facade over the skill parser and the sandbox manager.
//!
//! One entry point for the common flow: parse a `SKILL.md`, build a sandbox
//! from it, execute tools, tear it down.

use std::path::Path;
use std::sync::Arc;

use skillbox_core::{Result, SkillDefinition};
use skillbox_skills::SkillParser;

use crate::config::ContainerConfig;
use crate::manager::{SandboxInfo, SandboxManager};
use crate::runtime::ContainerRuntime;

/// Builds and manages sandboxes from skill files.
pub struct SandboxBuilder {
    parser: SkillParser,
    manager: SandboxManager,
}

impl SandboxBuilder {
    /// Builder backed by directory isolation.
    pub fn directory(base_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            parser: SkillParser::new(),
            manager: SandboxManager::directory(base_path),
        }
    }

    /// Builder backed by container isolation on the given runtime.
    pub fn container(
        base_path: impl Into<std::path::PathBuf>,
        runtime: Arc<dyn ContainerRuntime>,
        default_container_config: ContainerConfig,
    ) -> Result<Self> {
        Ok(Self {
            parser: SkillParser::new(),
            manager: SandboxManager::container(base_path, runtime, default_container_config)?,
        })
    }

    /// The underlying manager, for operations not surfaced here.
    pub fn manager(&self) -> &SandboxManager {
        &self.manager
    }

    /// Parse a skill file and build a sandbox from it.
    pub async fn build_from_skill_file(
        &self,
        skill_path: &Path,
        container_config: Option<&ContainerConfig>,
    ) -> Result<String> {
        let skill = self.parser.parse(skill_path).await?;
        self.build_from_skill(&skill, container_config).await
    }

    /// Build a sandbox from an already-parsed skill definition.
    pub async fn build_from_skill(
        &self,
        skill: &SkillDefinition,
        container_config: Option<&ContainerConfig>,
    ) -> Result<String> {
        self.manager.create_sandbox(skill, container_config).await
    }

    pub async fn sandbox_info(&self, sandbox_id: &str) -> Option<SandboxInfo> {
        self.manager.get_sandbox(sandbox_id).await
    }

    pub async fn execute_tool(
        &self,
        sandbox_id: &str,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.manager.execute_tool(sandbox_id, tool_name, args).await
    }

    pub async fn list_tools(&self, sandbox_id: &str) -> Result<Vec<String>> {
        self.manager.list_tools(sandbox_id).await
    }

    pub async fn cleanup_sandbox(&self, sandbox_id: &str) -> Result<bool> {
        self.manager.cleanup_sandbox(sandbox_id).await
    }

    pub async fn cleanup_all(&self) -> usize {
        self.manager.cleanup_all().await
    }
}
