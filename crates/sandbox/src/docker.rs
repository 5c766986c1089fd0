//! Docker implementation of the container runtime boundary.
//!
//! Talks to the local Docker daemon through the `bollard` crate. All
//! engine-specific types stay inside this module; everything above the
//! [`ContainerRuntime`] trait is runtime-agnostic.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

use skillbox_core::{Error, Result};

use crate::runtime::{
    ContainerBrief, ContainerDescriptor, ContainerRuntime, ContainerSpec, CpuSample, ExecOutput,
    ImageBuildSpec, ImageInfo, ImageLookup, RuntimeStats,
};

/// Docker-backed [`ContainerRuntime`] using the `bollard` crate.
pub struct DockerRuntime {
    docker: bollard::Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            Error::runtime(format!(
                "Failed to connect to Docker daemon: {}. Is Docker running?",
                e
            ))
        })?;
        Ok(Self { docker })
    }

    /// Wrap an existing bollard client.
    pub fn from_client(docker: bollard::Docker) -> Self {
        Self { docker }
    }

    /// Build an in-memory tar archive for the image build context.
    fn build_context(build: &ImageBuildSpec) -> Result<Vec<u8>> {
        let mut archive = tar::Builder::new(Vec::new());

        let mut append = |path: &str, contents: &[u8]| -> std::io::Result<()> {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            archive.append_data(&mut header, path, contents)
        };

        append("Dockerfile", build.dockerfile.as_bytes())?;
        for file in &build.files {
            append(&file.path, &file.contents)?;
        }

        Ok(archive.into_inner()?)
    }
}

fn is_status(err: &bollard::errors::Error, status: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == status
    )
}

fn container_error(id: &str, op: &str, err: bollard::errors::Error) -> Error {
    if is_status(&err, 404) {
        Error::ContainerNotFound(id.to_string())
    } else {
        Error::runtime(format!("Failed to {} container {}: {}", op, id, err))
    }
}

fn image_error(tag: &str, op: &str, err: bollard::errors::Error) -> Error {
    if is_status(&err, 404) {
        Error::ImageNotFound(tag.to_string())
    } else {
        Error::runtime(format!("Failed to {} image {}: {}", op, tag, err))
    }
}

fn rfc3339_to_unix(timestamp: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| Error::runtime(format!("Docker daemon unreachable: {}", e)))
    }

    // --- images ---------------------------------------------------------

    async fn build_image(&self, build: &ImageBuildSpec, tag: &str) -> Result<String> {
        use bollard::image::BuildImageOptions;

        let context = Self::build_context(build)?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: tag.to_string(),
            rm: true,
            pull: false,
            ..Default::default()
        };

        let mut stream =
            self.docker
                .build_image(options, None, Some(context.into()));

        while let Some(message) = stream.next().await {
            let info = message
                .map_err(|e| Error::image_build(format!("Build of {} failed: {}", tag, e)))?;
            if let Some(line) = info.stream {
                let line = line.trim();
                if !line.is_empty() {
                    tracing::debug!(tag = %tag, "{}", line);
                }
            }
            if let Some(error) = info.error {
                return Err(Error::image_build(format!(
                    "Build of {} failed: {}",
                    tag, error
                )));
            }
        }

        tracing::info!(tag = %tag, "Built image");
        Ok(tag.to_string())
    }

    async fn lookup_image(&self, tag: &str) -> Result<ImageLookup> {
        match self.docker.inspect_image(tag).await {
            Ok(inspect) => Ok(ImageLookup::Present(ImageInfo {
                id: inspect.id.unwrap_or_default(),
                tags: inspect.repo_tags.unwrap_or_default(),
                created: inspect
                    .created
                    .as_deref()
                    .map(rfc3339_to_unix)
                    .unwrap_or(0),
                size: inspect.size.unwrap_or(0),
            })),
            Err(err) if is_status(&err, 404) => Ok(ImageLookup::Absent),
            Err(err) => Err(image_error(tag, "inspect", err)),
        }
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        use bollard::image::ListImagesOptions;

        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(|e| Error::runtime(format!("Failed to list images: {}", e)))?;

        Ok(images
            .into_iter()
            .map(|image| ImageInfo {
                id: image.id,
                tags: image.repo_tags,
                created: image.created,
                size: image.size,
            })
            .collect())
    }

    async fn remove_image(&self, tag: &str) -> Result<()> {
        use bollard::image::RemoveImageOptions;

        self.docker
            .remove_image(
                tag,
                Some(RemoveImageOptions {
                    force: true,
                    ..Default::default()
                }),
                None,
            )
            .await
            .map_err(|e| image_error(tag, "remove", e))?;
        Ok(())
    }

    // --- containers -----------------------------------------------------

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::{HostConfig, ResourcesUlimits};

        let binds: Vec<String> = spec
            .binds
            .iter()
            .map(|bind| {
                if bind.read_only {
                    format!("{}:{}:ro", bind.host_path, bind.container_path)
                } else {
                    format!("{}:{}:rw", bind.host_path, bind.container_path)
                }
            })
            .collect();

        let host_config = HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            network_mode: Some(spec.network_mode.clone()),
            readonly_rootfs: Some(spec.read_only_rootfs),
            tmpfs: (!spec.tmpfs.is_empty()).then(|| {
                spec.tmpfs
                    .iter()
                    .map(|path| (path.clone(), String::new()))
                    .collect::<HashMap<_, _>>()
            }),
            memory: spec.memory_bytes,
            cpu_quota: spec.cpu_quota,
            cpu_period: spec.cpu_period,
            pids_limit: spec.pids_limit,
            ulimits: (!spec.ulimits.is_empty()).then(|| {
                spec.ulimits
                    .iter()
                    .map(|ulimit| ResourcesUlimits {
                        name: Some(ulimit.name.clone()),
                        soft: Some(ulimit.soft),
                        hard: Some(ulimit.hard),
                    })
                    .collect()
            }),
            cap_drop: (!spec.cap_drop.is_empty()).then(|| spec.cap_drop.clone()),
            cap_add: (!spec.cap_add.is_empty()).then(|| spec.cap_add.clone()),
            security_opt: (!spec.security_opt.is_empty()).then(|| spec.security_opt.clone()),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            working_dir: Some(spec.working_dir.clone()),
            cmd: (!spec.command.is_empty()).then(|| spec.command.clone()),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            user: spec.user.clone(),
            labels: (!spec.labels.is_empty()).then(|| spec.labels.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| {
                if is_status(&e, 404) {
                    Error::ImageNotFound(spec.image.clone())
                } else {
                    Error::runtime(format!("Failed to create container {}: {}", spec.name, e))
                }
            })?;

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(|e| container_error(id, "start", e))
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()> {
        use bollard::container::StopContainerOptions;

        self.docker
            .stop_container(
                id,
                Some(StopContainerOptions {
                    t: timeout.as_secs() as i64,
                }),
            )
            .await
            .map_err(|e| container_error(id, "stop", e))
    }

    async fn kill_container(&self, id: &str) -> Result<()> {
        self.docker
            .kill_container::<String>(id, None)
            .await
            .map_err(|e| container_error(id, "kill", e))
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        use bollard::container::RemoveContainerOptions;

        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| container_error(id, "remove", e))
    }

    async fn exec(&self, id: &str, command: &[String], timeout: Duration) -> Result<ExecOutput> {
        use bollard::exec::{CreateExecOptions, StartExecResults};

        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(command.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| container_error(id, "exec in", e))?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| container_error(id, "exec in", e))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            let collect = async {
                while let Some(message) = output.next().await {
                    match message {
                        Ok(bollard::container::LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(bollard::container::LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            stderr.push_str(&format!("\n[runtime error: {}]", e));
                            break;
                        }
                    }
                }
            };

            if tokio::time::timeout(timeout, collect).await.is_err() {
                tracing::warn!(container = %id, "Exec timed out");
                return Ok(ExecOutput {
                    exit_code: -1,
                    stdout,
                    stderr,
                    error: Some(format!("Execution timed out after {:?}", timeout)),
                });
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| container_error(id, "inspect exec in", e))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout,
            stderr,
            error: None,
        })
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDescriptor> {
        let inspect = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(|e| container_error(id, "inspect", e))?;

        let state = inspect.state.unwrap_or_default();
        let config = inspect.config.unwrap_or_default();

        Ok(ContainerDescriptor {
            id: inspect.id.unwrap_or_else(|| id.to_string()),
            name: inspect
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            status: state
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            running: state.running.unwrap_or(false),
            image: config.image.unwrap_or_default(),
            created: inspect.created.unwrap_or_default(),
            working_dir: config.working_dir.unwrap_or_default(),
            labels: config.labels.unwrap_or_default(),
        })
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerBrief>> {
        use bollard::container::ListContainersOptions;

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all,
                ..Default::default()
            }))
            .await
            .map_err(|e| Error::runtime(format!("Failed to list containers: {}", e)))?;

        Ok(containers
            .into_iter()
            .map(|summary| ContainerBrief {
                id: summary.id.unwrap_or_default(),
                name: summary
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                running: summary.state.as_deref() == Some("running"),
            })
            .collect())
    }

    async fn stats(&self, id: &str) -> Result<RuntimeStats> {
        use bollard::container::StatsOptions;

        let mut stream = self.docker.stats(
            id,
            Some(StatsOptions {
                stream: false,
                one_shot: false,
            }),
        );

        let stats = stream
            .next()
            .await
            .ok_or_else(|| Error::runtime(format!("No stats returned for container {}", id)))?
            .map_err(|e| container_error(id, "read stats for", e))?;

        let sample = |cpu: &bollard::container::CPUStats| CpuSample {
            total_usage: cpu.cpu_usage.total_usage,
            system_usage: cpu.system_cpu_usage.unwrap_or(0),
            online_cpus: cpu.online_cpus.unwrap_or_else(|| {
                cpu.cpu_usage
                    .percpu_usage
                    .as_ref()
                    .map(|v| v.len() as u64)
                    .unwrap_or(0)
            }),
        };

        let (network_rx, network_tx) = stats
            .networks
            .as_ref()
            .map(|networks| {
                networks.values().fold((0u64, 0u64), |(rx, tx), n| {
                    (rx + n.rx_bytes, tx + n.tx_bytes)
                })
            })
            .unwrap_or((0, 0));

        Ok(RuntimeStats {
            cpu: sample(&stats.cpu_stats),
            precpu: sample(&stats.precpu_stats),
            memory_usage: stats.memory_stats.usage.unwrap_or(0),
            memory_limit: stats.memory_stats.limit.unwrap_or(0),
            network_rx,
            network_tx,
            pids: stats.pids_stats.current.unwrap_or(0),
        })
    }
}
