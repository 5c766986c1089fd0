//! Container runtime boundary.
//!
//! The minimal set of operations the sandbox subsystem requires from an
//! external container engine, formalized as a narrow trait so that alternate
//! runtimes (or the in-memory [`crate::mocks::FakeRuntime`]) can be
//! substituted without touching calling code. [`crate::docker::DockerRuntime`]
//! is the production implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use skillbox_core::Result;

// =============================================================================
// Value types crossing the boundary
// =============================================================================

/// A host directory bound into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBind {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

/// Runtime-neutral description of a container to create.
///
/// Produced by [`crate::container::ContainerManager`] from a validated
/// [`crate::config::ContainerConfig`]; consumed verbatim by runtime
/// implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub working_dir: String,
    pub command: Vec<String>,
    pub binds: Vec<VolumeBind>,
    pub network_mode: String,
    pub read_only_rootfs: bool,
    pub tmpfs: Vec<String>,
    /// `KEY=VALUE` pairs.
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub memory_bytes: Option<i64>,
    pub cpu_quota: Option<i64>,
    pub cpu_period: Option<i64>,
    pub pids_limit: Option<i64>,
    pub ulimits: Vec<crate::config::Ulimit>,
    pub user: Option<String>,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub security_opt: Vec<String>,
}

/// A file shipped into an image build context alongside the Dockerfile.
#[derive(Debug, Clone)]
pub struct BuildFile {
    pub path: String,
    pub contents: Vec<u8>,
}

/// Dockerfile-equivalent build request.
#[derive(Debug, Clone)]
pub struct ImageBuildSpec {
    pub dockerfile: String,
    pub files: Vec<BuildFile>,
}

/// Description of a locally present image.
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub id: String,
    pub tags: Vec<String>,
    /// Creation time as a unix timestamp in seconds.
    pub created: i64,
    pub size: i64,
}

/// Result of an image cache lookup.
///
/// Presence is a value, not an error: "image not found, build it" is a plain
/// conditional on this type, never a caught not-found signal.
#[derive(Debug, Clone)]
pub enum ImageLookup {
    Present(ImageInfo),
    Absent,
}

impl ImageLookup {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }
}

/// Result of executing a command inside a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    /// Runtime-reported execution error (e.g. a timeout), if any.
    pub error: Option<String>,
}

impl ExecOutput {
    /// Whether the command completed cleanly.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }
}

/// Description of an existing container.
#[derive(Debug, Clone)]
pub struct ContainerDescriptor {
    pub id: String,
    pub name: String,
    /// Runtime status string (`running`, `exited`, ...).
    pub status: String,
    pub running: bool,
    pub image: String,
    pub created: String,
    pub working_dir: String,
    pub labels: HashMap<String, String>,
}

/// One entry of a container listing.
#[derive(Debug, Clone)]
pub struct ContainerBrief {
    pub id: String,
    pub name: String,
    pub running: bool,
}

/// One cumulative CPU usage sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuSample {
    /// Total CPU time consumed by the container, in nanoseconds.
    pub total_usage: u64,
    /// Total CPU time of the host system, in nanoseconds.
    pub system_usage: u64,
    /// Number of cores the sample covers.
    pub online_cpus: u64,
}

/// Raw cumulative counters returned by the runtime's stats endpoint.
///
/// Carries the current and the previous CPU sample so percentages can be
/// derived from consecutive cumulative readings.
#[derive(Debug, Clone, Default)]
pub struct RuntimeStats {
    pub cpu: CpuSample,
    pub precpu: CpuSample,
    pub memory_usage: u64,
    /// 0 when the runtime reports no limit.
    pub memory_limit: u64,
    pub network_rx: u64,
    pub network_tx: u64,
    pub pids: u64,
}

// =============================================================================
// Runtime trait
// =============================================================================

/// The narrow client interface onto an external container engine.
///
/// Implementations map these operations onto their engine's API and translate
/// engine-specific not-found signals into the dedicated not-found error
/// variants, so callers can distinguish "already gone" from real failures.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check the engine is reachable.
    async fn ping(&self) -> Result<()>;

    // --- images ---------------------------------------------------------

    /// Build an image from the given build spec and tag it. Returns the tag.
    async fn build_image(&self, build: &ImageBuildSpec, tag: &str) -> Result<String>;

    /// Look up an image by tag.
    async fn lookup_image(&self, tag: &str) -> Result<ImageLookup>;

    /// List all local images.
    async fn list_images(&self) -> Result<Vec<ImageInfo>>;

    /// Remove an image by tag.
    async fn remove_image(&self, tag: &str) -> Result<()>;

    // --- containers -----------------------------------------------------

    /// Create a container. Returns the container id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stop a container, giving it `timeout` to exit before it is killed.
    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()>;

    /// Terminate a container immediately.
    async fn kill_container(&self, id: &str) -> Result<()>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Execute a command (argv form) inside a running container.
    async fn exec(&self, id: &str, command: &[String], timeout: Duration) -> Result<ExecOutput>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDescriptor>;

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerBrief>>;

    /// Fetch one cumulative stats sample for a container.
    async fn stats(&self, id: &str) -> Result<RuntimeStats>;
}
