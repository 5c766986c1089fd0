//! In-memory fake of the container runtime boundary.
//!
//! Keeps container and image state in maps, serves scripted exec/stats
//! results, and records build and exec calls so tests can assert on them.
//! No Docker daemon required.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use skillbox_core::{Error, Result};

use crate::runtime::{
    ContainerBrief, ContainerDescriptor, ContainerRuntime, ContainerSpec, ExecOutput,
    ImageBuildSpec, ImageInfo, ImageLookup, RuntimeStats,
};

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    spec: ContainerSpec,
    running: bool,
}

#[derive(Default)]
struct FakeState {
    containers: HashMap<String, FakeContainer>,
    images: HashMap<String, ImageInfo>,
    exec_results: VecDeque<ExecOutput>,
    exec_log: Vec<(String, Vec<String>)>,
    stats_results: VecDeque<RuntimeStats>,
    built_tags: Vec<String>,
    counter: u64,
    fail_next_start: bool,
    fail_builds: bool,
}

impl FakeState {
    fn key_for(&self, id_or_name: &str) -> Option<String> {
        if self.containers.contains_key(id_or_name) {
            return Some(id_or_name.to_string());
        }
        self.containers
            .values()
            .find(|c| c.spec.name == id_or_name)
            .map(|c| c.id.clone())
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// In-memory [`ContainerRuntime`] for tests.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an exec result to be returned by the next `exec` call.
    pub async fn push_exec_result(&self, output: ExecOutput) {
        self.state.lock().await.exec_results.push_back(output);
    }

    /// Queue a stats sample to be returned by the next `stats` call.
    pub async fn push_stats(&self, stats: RuntimeStats) {
        self.state.lock().await.stats_results.push_back(stats);
    }

    /// Insert an image directly, with an explicit creation timestamp.
    pub async fn insert_image(&self, tag: &str, created: i64) {
        self.state.lock().await.images.insert(
            tag.to_string(),
            ImageInfo {
                id: format!("sha256:fake-{}", tag),
                tags: vec![tag.to_string()],
                created,
                size: 0,
            },
        );
    }

    /// Insert a running container directly (bypassing create/start).
    pub async fn insert_running_container(&self, id: &str) {
        let mut state = self.state.lock().await;
        state.containers.insert(
            id.to_string(),
            FakeContainer {
                id: id.to_string(),
                spec: ContainerSpec {
                    name: id.to_string(),
                    ..Default::default()
                },
                running: true,
            },
        );
    }

    /// Make the next `start_container` call fail.
    pub async fn fail_next_start(&self) {
        self.state.lock().await.fail_next_start = true;
    }

    /// Make all `build_image` calls fail.
    pub async fn fail_builds(&self) {
        self.state.lock().await.fail_builds = true;
    }

    /// Tags built so far, in order.
    pub async fn built_tags(&self) -> Vec<String> {
        self.state.lock().await.built_tags.clone()
    }

    /// Recorded exec invocations as `(container, argv)` pairs.
    pub async fn exec_log(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().await.exec_log.clone()
    }

    /// Number of containers currently known to the fake engine.
    pub async fn container_count(&self) -> usize {
        self.state.lock().await.containers.len()
    }

    /// Whether a container exists, by id or name.
    pub async fn has_container(&self, id_or_name: &str) -> bool {
        let state = self.state.lock().await;
        state.key_for(id_or_name).is_some()
    }

    /// Whether a container is running, by id or name.
    pub async fn is_running(&self, id_or_name: &str) -> bool {
        let state = self.state.lock().await;
        state
            .key_for(id_or_name)
            .and_then(|key| state.containers.get(&key).map(|c| c.running))
            .unwrap_or(false)
    }

    /// Whether an image with this tag exists.
    pub async fn has_image(&self, tag: &str) -> bool {
        self.state.lock().await.images.contains_key(tag)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn build_image(&self, _build: &ImageBuildSpec, tag: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        if state.fail_builds {
            return Err(Error::image_build(format!(
                "Build of {} failed: fake build failure",
                tag
            )));
        }
        state.built_tags.push(tag.to_string());
        state.images.insert(
            tag.to_string(),
            ImageInfo {
                id: format!("sha256:fake-{}", tag),
                tags: vec![tag.to_string()],
                created: now_unix(),
                size: 0,
            },
        );
        Ok(tag.to_string())
    }

    async fn lookup_image(&self, tag: &str) -> Result<ImageLookup> {
        let state = self.state.lock().await;
        Ok(match state.images.get(tag) {
            Some(info) => ImageLookup::Present(info.clone()),
            None => ImageLookup::Absent,
        })
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        Ok(self.state.lock().await.images.values().cloned().collect())
    }

    async fn remove_image(&self, tag: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .images
            .remove(tag)
            .map(|_| ())
            .ok_or_else(|| Error::ImageNotFound(tag.to_string()))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state.lock().await;
        if !state.images.contains_key(&spec.image) {
            return Err(Error::ImageNotFound(spec.image.clone()));
        }
        if state.key_for(&spec.name).is_some() {
            return Err(Error::runtime(format!(
                "Container name {} already in use",
                spec.name
            )));
        }
        state.counter += 1;
        let id = format!("fake-{:08}", state.counter);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                spec: spec.clone(),
                running: false,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_next_start {
            state.fail_next_start = false;
            return Err(Error::runtime(format!(
                "Failed to start container {}: fake start failure",
                id
            )));
        }
        let key = state
            .key_for(id)
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))?;
        state.containers.get_mut(&key).expect("key resolved").running = true;
        Ok(())
    }

    async fn stop_container(&self, id: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        let key = state
            .key_for(id)
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))?;
        state.containers.get_mut(&key).expect("key resolved").running = false;
        Ok(())
    }

    async fn kill_container(&self, id: &str) -> Result<()> {
        self.stop_container(id, Duration::from_secs(0)).await
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let key = state
            .key_for(id)
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))?;
        let container = state.containers.get(&key).expect("key resolved");
        if container.running && !force {
            return Err(Error::runtime(format!(
                "Cannot remove running container {}",
                id
            )));
        }
        state.containers.remove(&key);
        Ok(())
    }

    async fn exec(&self, id: &str, command: &[String], _timeout: Duration) -> Result<ExecOutput> {
        let mut state = self.state.lock().await;
        let key = state
            .key_for(id)
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))?;
        state.exec_log.push((key, command.to_vec()));
        Ok(state.exec_results.pop_front().unwrap_or_default())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDescriptor> {
        let state = self.state.lock().await;
        let key = state
            .key_for(id)
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))?;
        let container = state.containers.get(&key).expect("key resolved");
        Ok(ContainerDescriptor {
            id: container.id.clone(),
            name: container.spec.name.clone(),
            status: if container.running {
                "running".to_string()
            } else {
                "created".to_string()
            },
            running: container.running,
            image: container.spec.image.clone(),
            created: String::new(),
            working_dir: container.spec.working_dir.clone(),
            labels: container.spec.labels.clone(),
        })
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerBrief>> {
        let state = self.state.lock().await;
        Ok(state
            .containers
            .values()
            .filter(|c| all || c.running)
            .map(|c| ContainerBrief {
                id: c.id.clone(),
                name: c.spec.name.clone(),
                running: c.running,
            })
            .collect())
    }

    async fn stats(&self, id: &str) -> Result<RuntimeStats> {
        let mut state = self.state.lock().await;
        if state.key_for(id).is_none() {
            return Err(Error::ContainerNotFound(id.to_string()));
        }
        Ok(state.stats_results.pop_front().unwrap_or_default())
    }
}
