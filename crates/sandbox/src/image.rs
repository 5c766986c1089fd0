//! Skill image builder.
//!
//! Derives a deterministic image identity from a skill's environment
//! requirements and builds the image only when it is absent. The identity is
//! the caching key: two skills with the same base image, interpreter version,
//! and package sets resolve to the same identity regardless of declaration
//! order, so equivalent environments share one image.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use skillbox_core::{Error, Result, SkillDefinition};

use crate::executor::{TOOLEXEC_CONTAINER_PATH, TOOLEXEC_PROTOCOL_VERSION, TOOLEXEC_SOURCE};
use crate::runtime::{BuildFile, ContainerRuntime, ImageBuildSpec, ImageInfo, ImageLookup};

/// Tag prefix of all skill images.
pub const SKILL_IMAGE_PREFIX: &str = "skill-";

/// Builds container images for skills, with content-addressed caching.
pub struct ImageBuilder {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ImageBuilder {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// The deterministic image identity for a skill on a base image:
    /// `skill-<sanitized-name>-<12-hex-digest>`.
    pub fn image_tag(skill: &SkillDefinition, base_image: &str) -> String {
        let fingerprint = Self::requirements_fingerprint(skill, base_image);
        let digest = Sha256::digest(fingerprint.as_bytes());
        let short = format!("{:x}", digest);

        let sanitized: String = skill
            .name
            .to_lowercase()
            .replace([' ', '_'], "-")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();

        format!("{}{}-{}", SKILL_IMAGE_PREFIX, sanitized, &short[..12])
    }

    /// Canonical string the identity digest is computed over. Package sets
    /// are sorted so the hash is order-independent.
    fn requirements_fingerprint(skill: &SkillDefinition, base_image: &str) -> String {
        let mut parts = vec![
            format!("v{}", TOOLEXEC_PROTOCOL_VERSION),
            base_image.to_string(),
            skill.environment.python_version.clone().unwrap_or_default(),
        ];

        if !skill.environment.packages.is_empty() {
            let mut packages = skill.environment.packages.clone();
            packages.sort();
            parts.push(packages.join("|"));
        }

        if !skill.environment.system_packages.is_empty() {
            let mut system_packages = skill.environment.system_packages.clone();
            system_packages.sort();
            parts.push(format!("sys:{}", system_packages.join("|")));
        }

        parts.join("\n")
    }

    /// Resolve the image identity for a skill, building the image if it is
    /// not already present. A cache hit returns the identity with no build
    /// side effect.
    pub async fn ensure_image(&self, skill: &SkillDefinition, base_image: &str) -> Result<String> {
        if base_image.trim().is_empty() {
            return Err(Error::invalid_input("base_image cannot be empty"));
        }

        let tag = Self::image_tag(skill, base_image);

        match self.runtime.lookup_image(&tag).await? {
            ImageLookup::Present(_) => {
                tracing::debug!(tag = %tag, "Image already exists, skipping build");
                Ok(tag)
            }
            ImageLookup::Absent => {
                tracing::info!(tag = %tag, skill = %skill.name, "Building image");
                let build = ImageBuildSpec {
                    dockerfile: Self::generate_dockerfile(skill, base_image),
                    files: vec![BuildFile {
                        path: "toolexec.py".to_string(),
                        contents: TOOLEXEC_SOURCE.as_bytes().to_vec(),
                    }],
                };
                self.runtime.build_image(&build, &tag).await
            }
        }
    }

    fn generate_dockerfile(skill: &SkillDefinition, base_image: &str) -> String {
        let mut lines = vec![
            format!("FROM {}", base_image),
            String::new(),
            "WORKDIR /workspace".to_string(),
            String::new(),
            "RUN useradd -m -u 1000 sandbox && \\".to_string(),
            "    chown -R sandbox:sandbox /workspace".to_string(),
            String::new(),
        ];

        if !skill.environment.system_packages.is_empty() {
            lines.extend([
                "RUN apt-get update && \\".to_string(),
                format!(
                    "    apt-get install -y {} && \\",
                    skill.environment.system_packages.join(" ")
                ),
                "    rm -rf /var/lib/apt/lists/*".to_string(),
                String::new(),
            ]);
        }

        if !skill.environment.packages.is_empty() {
            lines.extend([
                format!(
                    "RUN pip install --no-cache-dir {}",
                    skill.environment.packages.join(" ")
                ),
                String::new(),
            ]);
        }

        lines.extend([
            format!("COPY toolexec.py {}", TOOLEXEC_CONTAINER_PATH),
            String::new(),
            "USER sandbox".to_string(),
            String::new(),
            "ENV PYTHONUNBUFFERED=1".to_string(),
            "ENV PYTHONPATH=/workspace".to_string(),
            String::new(),
            // Keep the container alive for exec commands
            "CMD [\"sleep\", \"infinity\"]".to_string(),
        ]);

        lines.join("\n")
    }

    /// Information about a built image, or `None` if it does not exist.
    pub async fn image_info(&self, tag: &str) -> Result<Option<ImageInfo>> {
        Ok(match self.runtime.lookup_image(tag).await? {
            ImageLookup::Present(info) => Some(info),
            ImageLookup::Absent => None,
        })
    }

    /// Tags of all locally present skill images.
    pub async fn list_skill_images(&self) -> Result<Vec<String>> {
        let images = self.runtime.list_images().await?;
        let mut tags: Vec<String> = images
            .into_iter()
            .flat_map(|image| image.tags)
            .filter(|tag| tag.starts_with(SKILL_IMAGE_PREFIX))
            .collect();
        tags.sort();
        Ok(tags)
    }

    /// Housekeeping sweep: remove skill images older than `older_than`,
    /// excluding `keep_tags`. Individual failures are tolerated; returns the
    /// number of images removed.
    pub async fn cleanup_unused_images(&self, older_than: Duration, keep_tags: &[String]) -> usize {
        let cutoff = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|now| now.as_secs() as i64 - older_than.as_secs() as i64)
            .unwrap_or(0);

        let images = match self.runtime.list_images().await {
            Ok(images) => images,
            Err(e) => {
                tracing::error!("Failed to list images for cleanup: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for image in images {
            let Some(tag) = image
                .tags
                .iter()
                .find(|tag| tag.starts_with(SKILL_IMAGE_PREFIX))
            else {
                continue;
            };
            if image.tags.iter().any(|t| keep_tags.contains(t)) {
                continue;
            }
            if image.created > cutoff {
                continue;
            }

            match self.runtime.remove_image(tag).await {
                Ok(()) => {
                    removed += 1;
                    tracing::info!(tag = %tag, "Removed unused skill image");
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    tracing::warn!(tag = %tag, "Failed to remove image: {}", e);
                }
            }
        }

        tracing::info!(count = removed, "Image cleanup sweep finished");
        removed
    }
}
