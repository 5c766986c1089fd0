//! Directory-backend environment builder.
//!
//! The lightweight isolation tier: a per-sandbox directory tree with an
//! optional Python virtual environment and installed packages. Tool
//! execution for this backend runs in-process against the workspace
//! directory, guarded by path containment only.

use std::path::{Path, PathBuf};
use std::time::Duration;

use skillbox_core::{Error, Result, SkillDefinition};

use crate::metadata::SandboxMetadata;

const VENV_CREATE_TIMEOUT: Duration = Duration::from_secs(30);
const PACKAGE_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);
const INTERPRETER_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds directory-based sandbox environments.
pub struct EnvironmentBuilder {
    base_path: PathBuf,
}

impl EnvironmentBuilder {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Create a sandbox environment for a skill.
    ///
    /// Lays out `workspace/` and `logs/` under a per-sandbox root,
    /// provisions a virtual environment and installs packages when the skill
    /// requires them, and persists the metadata document. Any failure rolls
    /// the whole directory back; creation is never partially applied.
    pub async fn create_environment(
        &self,
        skill: &SkillDefinition,
        sandbox_id: &str,
    ) -> Result<PathBuf> {
        if sandbox_id.trim().is_empty() {
            return Err(Error::invalid_input("sandbox_id cannot be empty"));
        }

        let sandbox_path = self.base_path.join(sandbox_id);
        if sandbox_path.exists() {
            return Err(Error::DuplicateSandbox(sandbox_id.to_string()));
        }

        match self.populate(skill, sandbox_id, &sandbox_path).await {
            Ok(()) => {
                tracing::info!(
                    sandbox_id = %sandbox_id,
                    path = %sandbox_path.display(),
                    "Created directory environment"
                );
                Ok(sandbox_path)
            }
            Err(e) => {
                if sandbox_path.exists() {
                    let _ = tokio::fs::remove_dir_all(&sandbox_path).await;
                }
                Err(Error::environment(format!(
                    "Failed to create environment: {}",
                    e
                )))
            }
        }
    }

    async fn populate(
        &self,
        skill: &SkillDefinition,
        sandbox_id: &str,
        sandbox_path: &Path,
    ) -> Result<()> {
        tokio::fs::create_dir_all(sandbox_path.join("workspace")).await?;
        tokio::fs::create_dir_all(sandbox_path.join("logs")).await?;

        let mut venv_path = None;
        if skill.environment.python_version.is_some() {
            venv_path = Some(
                self.setup_python_environment(
                    sandbox_path,
                    skill.environment.python_version.as_deref(),
                )
                .await?,
            );
        }

        if !skill.environment.packages.is_empty() {
            // Packages need a venv even when no interpreter version was pinned
            let venv = match &venv_path {
                Some(path) => path.clone(),
                None => {
                    let path = self.setup_python_environment(sandbox_path, None).await?;
                    venv_path = Some(path.clone());
                    path
                }
            };
            self.install_packages(&venv, &skill.environment.packages)
                .await?;
        }

        let mut metadata = SandboxMetadata::for_skill(skill, sandbox_id, sandbox_path);
        metadata.venv_path = venv_path;
        metadata.save(sandbox_path).await
    }

    /// Remove a sandbox directory. Returns `false` if it did not exist.
    pub async fn cleanup(&self, sandbox_id: &str) -> Result<bool> {
        let sandbox_path = self.base_path.join(sandbox_id);
        if !sandbox_path.exists() {
            return Ok(false);
        }

        tokio::fs::remove_dir_all(&sandbox_path).await.map_err(|e| {
            Error::environment(format!(
                "Failed to cleanup sandbox {}: {}",
                sandbox_id, e
            ))
        })?;
        tracing::info!(sandbox_id = %sandbox_id, "Removed directory environment");
        Ok(true)
    }

    async fn setup_python_environment(
        &self,
        sandbox_path: &Path,
        python_version: Option<&str>,
    ) -> Result<PathBuf> {
        let venv_path = sandbox_path.join("venv");
        if venv_path.exists() {
            return Ok(venv_path);
        }

        let interpreter = match python_version {
            Some(version) => {
                let candidate = format!("python{}", version);
                if probe_interpreter(&candidate).await {
                    candidate
                } else {
                    // Requested version not installed; fall back to the default
                    "python3".to_string()
                }
            }
            None => "python3".to_string(),
        };

        let mut command = tokio::process::Command::new(&interpreter);
        command.arg("-m").arg("venv").arg(&venv_path);
        run_command(command, VENV_CREATE_TIMEOUT, "Virtual environment creation").await?;

        tracing::debug!(venv = %venv_path.display(), interpreter = %interpreter, "Created venv");
        Ok(venv_path)
    }

    async fn install_packages(&self, venv_path: &Path, packages: &[String]) -> Result<()> {
        let pip = if cfg!(windows) {
            venv_path.join("Scripts").join("pip")
        } else {
            venv_path.join("bin").join("pip")
        };

        if !pip.exists() {
            return Err(Error::environment(format!(
                "pip not found in virtual environment at {}",
                venv_path.display()
            )));
        }

        let mut command = tokio::process::Command::new(&pip);
        command.arg("install").args(packages);
        run_command(command, PACKAGE_INSTALL_TIMEOUT, "Package installation").await?;

        tracing::info!(count = packages.len(), "Installed packages into venv");
        Ok(())
    }
}

async fn probe_interpreter(interpreter: &str) -> bool {
    let mut command = tokio::process::Command::new(interpreter);
    command.arg("--version");
    matches!(
        tokio::time::timeout(INTERPRETER_PROBE_TIMEOUT, command.output()).await,
        Ok(Ok(output)) if output.status.success()
    )
}

async fn run_command(
    mut command: tokio::process::Command,
    timeout: Duration,
    what: &str,
) -> Result<std::process::Output> {
    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| Error::timeout(format!("{} timed out after {:?}", what, timeout)))?
        .map_err(|e| Error::environment(format!("{} failed to start: {}", what, e)))?;

    if !output.status.success() {
        return Err(Error::environment(format!(
            "{} failed: {}",
            what,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_skill() -> SkillDefinition {
        SkillDefinition::new("bare", "no requirements", "just files").unwrap()
    }

    #[tokio::test]
    async fn test_create_lays_out_directories_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let builder = EnvironmentBuilder::new(dir.path());

        let sandbox_path = builder
            .create_environment(&bare_skill(), "sb1")
            .await
            .unwrap();

        assert!(sandbox_path.join("workspace").is_dir());
        assert!(sandbox_path.join("logs").is_dir());

        let metadata = SandboxMetadata::load(&sandbox_path).await.unwrap();
        assert_eq!(metadata.sandbox_id, "sb1");
        assert_eq!(metadata.skill_name, "bare");
        assert!(metadata.venv_path.is_none());
        assert_eq!(metadata.workspace_path, sandbox_path.join("workspace"));
    }

    #[tokio::test]
    async fn test_duplicate_sandbox_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let builder = EnvironmentBuilder::new(dir.path());

        builder
            .create_environment(&bare_skill(), "sb1")
            .await
            .unwrap();
        let err = builder
            .create_environment(&bare_skill(), "sb1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateSandbox(_)));
    }

    #[tokio::test]
    async fn test_empty_sandbox_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let builder = EnvironmentBuilder::new(dir.path());
        assert!(builder.create_environment(&bare_skill(), " ").await.is_err());
    }

    #[tokio::test]
    async fn test_cleanup_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let builder = EnvironmentBuilder::new(dir.path());

        builder
            .create_environment(&bare_skill(), "sb1")
            .await
            .unwrap();

        assert!(builder.cleanup("sb1").await.unwrap());
        assert!(!dir.path().join("sb1").exists());
        assert!(!builder.cleanup("sb1").await.unwrap());
    }
}
