//! Container-backend environment builder.
//!
//! Composes the image builder and the container manager into a single
//! "create sandbox environment" operation: ensure the skill image, create
//! and start the container, lay out the sandbox directories, persist
//! metadata. Any step failing triggers this builder's own cleanup before the
//! error is re-raised, so no orphaned container or directory survives a
//! failed creation.

use std::path::PathBuf;
use std::sync::Arc;

use skillbox_core::{Error, Result, SkillDefinition};

use crate::config::ContainerConfig;
use crate::container::ContainerManager;
use crate::image::ImageBuilder;
use crate::metadata::{ContainerConfigSnapshot, SandboxMetadata};
use crate::runtime::ContainerRuntime;

/// Handles returned by a successful environment creation.
#[derive(Debug, Clone)]
pub struct ContainerEnvironmentInfo {
    pub sandbox_id: String,
    pub container_id: String,
    pub image_tag: String,
    pub workspace_path: PathBuf,
}

/// Builds container-based sandbox environments.
pub struct ContainerEnvironmentBuilder {
    base_path: PathBuf,
    images: ImageBuilder,
    containers: Arc<ContainerManager>,
}

impl ContainerEnvironmentBuilder {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            images: ImageBuilder::new(runtime.clone()),
            containers: Arc::new(ContainerManager::new(runtime, base_path.clone())),
            base_path,
        }
    }

    /// The container manager this builder drives.
    pub fn containers(&self) -> &Arc<ContainerManager> {
        &self.containers
    }

    /// The image builder this builder drives.
    pub fn images(&self) -> &ImageBuilder {
        &self.images
    }

    /// Create a container environment for a skill.
    pub async fn create_environment(
        &self,
        skill: &SkillDefinition,
        sandbox_id: &str,
        config: &ContainerConfig,
    ) -> Result<ContainerEnvironmentInfo> {
        if sandbox_id.trim().is_empty() {
            return Err(Error::invalid_input("sandbox_id cannot be empty"));
        }
        config.validate()?;

        let sandbox_path = self.base_path.join(sandbox_id);
        if sandbox_path.exists() {
            return Err(Error::DuplicateSandbox(sandbox_id.to_string()));
        }

        match self.build(skill, sandbox_id, config).await {
            Ok(info) => {
                tracing::info!(
                    sandbox_id = %sandbox_id,
                    container_id = %info.container_id,
                    image = %info.image_tag,
                    "Created container environment"
                );
                Ok(info)
            }
            Err(e) => {
                // Roll back whatever was built before re-raising
                if let Err(cleanup_err) = self.cleanup(sandbox_id, false).await {
                    tracing::warn!(
                        sandbox_id = %sandbox_id,
                        "Rollback after failed creation incomplete: {}",
                        cleanup_err
                    );
                }
                Err(Error::environment(format!(
                    "Failed to create container environment: {}",
                    e
                )))
            }
        }
    }

    async fn build(
        &self,
        skill: &SkillDefinition,
        sandbox_id: &str,
        config: &ContainerConfig,
    ) -> Result<ContainerEnvironmentInfo> {
        let image_tag = self.images.ensure_image(skill, &config.base_image).await?;

        let container_id = self.containers.create(sandbox_id, &image_tag, config).await?;
        self.containers.start(&container_id).await?;

        let sandbox_path = self.base_path.join(sandbox_id);
        tokio::fs::create_dir_all(sandbox_path.join("logs")).await?;

        let mut metadata = SandboxMetadata::for_skill(skill, sandbox_id, &sandbox_path);
        metadata.container_id = Some(container_id.clone());
        metadata.image_tag = Some(image_tag.clone());
        metadata.container_config = Some(ContainerConfigSnapshot::from(config));
        metadata.save(&sandbox_path).await?;

        Ok(ContainerEnvironmentInfo {
            sandbox_id: sandbox_id.to_string(),
            container_id,
            image_tag,
            workspace_path: sandbox_path.join("workspace"),
        })
    }

    /// Tear down a container environment. Returns `false` if the sandbox
    /// directory did not exist.
    ///
    /// Recovers the container and image identities from the persisted
    /// metadata so cleanup works across process restarts. A missing or
    /// corrupt metadata file is tolerated: the container is then found via
    /// the `sandbox-<id>` naming convention, and the directory tree is
    /// removed either way.
    pub async fn cleanup(&self, sandbox_id: &str, remove_image: bool) -> Result<bool> {
        if sandbox_id.trim().is_empty() {
            return Ok(false);
        }

        let sandbox_path = self.base_path.join(sandbox_id);
        if !sandbox_path.exists() {
            // Nothing on disk; sweep any stray container left by a failed
            // creation that never reached the directory layout
            self.containers.cleanup_containers(Some(sandbox_id)).await;
            return Ok(false);
        }

        let metadata = match SandboxMetadata::load(&sandbox_path).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::warn!(sandbox_id = %sandbox_id, "Failed to load metadata: {}", e);
                None
            }
        };

        match metadata.as_ref().and_then(|m| m.container_id.as_deref()) {
            Some(container_id) => {
                if let Err(e) = self.containers.stop(container_id, None).await {
                    if !e.is_not_found() {
                        tracing::debug!(container_id = %container_id, "Stop during cleanup failed: {}", e);
                    }
                }
                if let Err(e) = self.containers.remove(container_id, true).await {
                    tracing::warn!(container_id = %container_id, "Failed to remove container: {}", e);
                }
            }
            None => {
                // No usable metadata; fall back to the naming convention
                self.containers.cleanup_containers(Some(sandbox_id)).await;
            }
        }

        if remove_image {
            if let Some(image_tag) = metadata.as_ref().and_then(|m| m.image_tag.as_deref()) {
                match self.containers.runtime().remove_image(image_tag).await {
                    Ok(()) => tracing::info!(tag = %image_tag, "Removed image"),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => tracing::warn!(tag = %image_tag, "Failed to remove image: {}", e),
                }
            }
        }

        tokio::fs::remove_dir_all(&sandbox_path).await.map_err(|e| {
            Error::environment(format!(
                "Failed to remove sandbox directory {}: {}",
                sandbox_path.display(),
                e
            ))
        })?;

        tracing::info!(sandbox_id = %sandbox_id, "Removed container environment");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::FakeRuntime;

    fn skill() -> SkillDefinition {
        SkillDefinition::new("envtest", "env builder test", "do things").unwrap()
    }

    fn setup() -> (Arc<FakeRuntime>, ContainerEnvironmentBuilder, tempfile::TempDir) {
        let runtime = Arc::new(FakeRuntime::new());
        let dir = tempfile::tempdir().unwrap();
        let builder = ContainerEnvironmentBuilder::new(runtime.clone(), dir.path());
        (runtime, builder, dir)
    }

    #[tokio::test]
    async fn test_create_builds_starts_and_persists() {
        let (runtime, builder, dir) = setup();

        let info = builder
            .create_environment(&skill(), "sb1", &ContainerConfig::default())
            .await
            .unwrap();

        assert!(info.image_tag.starts_with("skill-envtest-"));
        assert!(runtime.is_running(&info.container_id).await);
        assert!(dir.path().join("sb1/workspace").is_dir());
        assert!(dir.path().join("sb1/logs").is_dir());

        let metadata = SandboxMetadata::load(&dir.path().join("sb1")).await.unwrap();
        assert_eq!(metadata.container_id.as_deref(), Some(info.container_id.as_str()));
        assert_eq!(metadata.image_tag.as_deref(), Some(info.image_tag.as_str()));
        let snapshot = metadata.container_config.unwrap();
        assert_eq!(snapshot.base_image, "python:3.11-slim");
        assert_eq!(snapshot.working_dir, "/workspace");
    }

    #[tokio::test]
    async fn test_failed_start_rolls_back_everything() {
        let (runtime, builder, dir) = setup();
        runtime.fail_next_start().await;

        let err = builder
            .create_environment(&skill(), "sb1", &ContainerConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("fake start failure"));

        // No orphaned container or directory survives the failed creation
        assert_eq!(runtime.container_count().await, 0);
        assert!(!dir.path().join("sb1").exists());
    }

    #[tokio::test]
    async fn test_cleanup_recovers_handles_from_metadata() {
        let (runtime, _, dir) = setup();

        {
            let builder = ContainerEnvironmentBuilder::new(runtime.clone(), dir.path());
            builder
                .create_environment(&skill(), "sb1", &ContainerConfig::default())
                .await
                .unwrap();
        }

        // A fresh builder (new process) still finds the container via metadata
        let builder = ContainerEnvironmentBuilder::new(runtime.clone(), dir.path());
        assert!(builder.cleanup("sb1", false).await.unwrap());
        assert_eq!(runtime.container_count().await, 0);
        assert!(!dir.path().join("sb1").exists());
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_corrupt_metadata() {
        let (runtime, builder, dir) = setup();
        builder
            .create_environment(&skill(), "sb1", &ContainerConfig::default())
            .await
            .unwrap();

        tokio::fs::write(dir.path().join("sb1/metadata.json"), "{broken")
            .await
            .unwrap();

        assert!(builder.cleanup("sb1", false).await.unwrap());
        assert!(!dir.path().join("sb1").exists());
        // Container found by naming convention despite the corrupt metadata
        assert_eq!(runtime.container_count().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_missing_sandbox_returns_false() {
        let (_, builder, _dir) = setup();
        assert!(!builder.cleanup("ghost", false).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_can_remove_image() {
        let (runtime, builder, _dir) = setup();
        let info = builder
            .create_environment(&skill(), "sb1", &ContainerConfig::default())
            .await
            .unwrap();
        assert!(runtime.has_image(&info.image_tag).await);

        builder.cleanup("sb1", true).await.unwrap();
        assert!(!runtime.has_image(&info.image_tag).await);
    }
}
