//! Container resource monitoring and limit enforcement.
//!
//! Polls per-container statistics through the runtime boundary, compares
//! them against configured limits, and applies escalating enforcement
//! actions. Violation history is tracked per container and cleared when the
//! container returns within limits or is cleaned up.
//!
//! The violation map lives behind a single lock, so concurrent `enforce` and
//! `sweep` calls on the same container serialize their state updates; which
//! of two racing stop/kill actions reaches the runtime first is up to the
//! caller, and both actions are tolerated on an already-stopped container.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use skillbox_core::{Error, Result};

use crate::config::{parse_memory_size, ContainerConfig};
use crate::runtime::{ContainerRuntime, RuntimeStats};

/// Grace period used when enforcement stops a container.
const ENFORCE_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Memory safety threshold, as a percentage of the runtime-reported limit.
const MEMORY_PERCENT_THRESHOLD: f64 = 95.0;

/// A point-in-time view of a container's resource usage.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerStats {
    /// CPU utilization percentage in `[0, 100]`, derived from two
    /// consecutive cumulative samples.
    pub cpu_percent: f64,
    pub memory_usage: u64,
    /// 0 when the runtime reports no limit.
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
    pub pids: u64,
    /// Unix timestamp (seconds) when the sample was taken.
    pub timestamp: f64,
}

/// Enforcement action requested by the caller. The ladder never escalates on
/// its own; each call applies exactly the action it was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforceAction {
    /// Record the violation in the log only.
    Log,
    /// Same, at warning severity.
    Warn,
    /// Gracefully stop the container.
    Stop,
    /// Terminate the container immediately.
    Kill,
}

/// What actually happened during an enforcement check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    None,
    Logged,
    Warned,
    Stopped,
    StopFailed,
    Killed,
    KillFailed,
}

/// Result of an enforcement check.
#[derive(Debug, Clone)]
pub struct EnforcementReport {
    pub exceeded: bool,
    pub violations: Vec<String>,
    pub action_taken: ActionTaken,
    pub stats: ContainerStats,
}

/// Tracked violation history for one container.
#[derive(Debug, Clone)]
pub struct ViolationEntry {
    pub first_exceeded: Instant,
    pub exceeded_count: u64,
}

/// Monitors containers and enforces resource limits.
pub struct ResourceManager {
    runtime: Arc<dyn ContainerRuntime>,
    default_config: ContainerConfig,
    exceeded: Mutex<HashMap<String, ViolationEntry>>,
}

impl ResourceManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self::with_default_config(runtime, ContainerConfig::default())
    }

    /// Use a specific configuration for limit comparison when `enforce` is
    /// called without one.
    pub fn with_default_config(
        runtime: Arc<dyn ContainerRuntime>,
        default_config: ContainerConfig,
    ) -> Self {
        Self {
            runtime,
            default_config,
            exceeded: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch and derive current usage statistics for a container.
    pub async fn stats(&self, container_id: &str) -> Result<ContainerStats> {
        if container_id.trim().is_empty() {
            return Err(Error::invalid_input("container_id cannot be empty"));
        }

        let raw = self.runtime.stats(container_id).await?;
        let stats = derive_stats(&raw);
        tracing::debug!(
            container_id = %container_id,
            cpu = stats.cpu_percent,
            memory = stats.memory_percent,
            "Sampled container stats"
        );
        Ok(stats)
    }

    /// Check a container against its limits and apply the requested action
    /// if any dimension is exceeded.
    pub async fn enforce(
        &self,
        container_id: &str,
        config: Option<&ContainerConfig>,
        action: EnforceAction,
    ) -> Result<EnforcementReport> {
        if container_id.trim().is_empty() {
            return Err(Error::invalid_input("container_id cannot be empty"));
        }

        let config = config.unwrap_or(&self.default_config);
        let limits = &config.resource_limits;
        let stats = self.stats(container_id).await?;

        let mut violations = Vec::new();

        if let Some(cpus) = limits.cpus {
            let ceiling = cpus * 100.0;
            if stats.cpu_percent > ceiling {
                violations.push(format!(
                    "CPU usage {}% exceeds limit {}%",
                    stats.cpu_percent, ceiling
                ));
            }
        }

        if let Some(memory) = &limits.memory {
            let limit_bytes = parse_memory_size(memory)?;
            if limit_bytes > 0 && stats.memory_usage > limit_bytes {
                violations.push(format!(
                    "Memory usage {} bytes exceeds limit {} bytes",
                    stats.memory_usage, limit_bytes
                ));
            }
            if stats.memory_limit > 0 && stats.memory_percent > MEMORY_PERCENT_THRESHOLD {
                violations.push(format!(
                    "Memory usage {}% exceeds {}% threshold",
                    stats.memory_percent, MEMORY_PERCENT_THRESHOLD
                ));
            }
        }

        if let Some(pids_limit) = limits.pids_limit {
            if stats.pids > pids_limit as u64 {
                violations.push(format!(
                    "Process count {} exceeds limit {}",
                    stats.pids, pids_limit
                ));
            }
        }

        let exceeded = !violations.is_empty();
        let action_taken = if exceeded {
            {
                let mut tracked = self.exceeded.lock().await;
                let entry = tracked
                    .entry(container_id.to_string())
                    .or_insert_with(|| ViolationEntry {
                        first_exceeded: Instant::now(),
                        exceeded_count: 0,
                    });
                entry.exceeded_count += 1;
            }
            self.apply_action(container_id, action, &violations).await
        } else {
            // Back within limits: clear the tracked state
            self.exceeded.lock().await.remove(container_id);
            ActionTaken::None
        };

        Ok(EnforcementReport {
            exceeded,
            violations,
            action_taken,
            stats,
        })
    }

    async fn apply_action(
        &self,
        container_id: &str,
        action: EnforceAction,
        violations: &[String],
    ) -> ActionTaken {
        let summary = violations.join(", ");
        match action {
            EnforceAction::Log => {
                tracing::info!(container_id = %container_id, "Container exceeded limits: {}", summary);
                ActionTaken::Logged
            }
            EnforceAction::Warn => {
                tracing::warn!(container_id = %container_id, "Container exceeded limits: {}", summary);
                ActionTaken::Warned
            }
            EnforceAction::Stop => {
                match self
                    .runtime
                    .stop_container(container_id, ENFORCE_STOP_TIMEOUT)
                    .await
                {
                    Ok(()) => {
                        tracing::warn!(
                            container_id = %container_id,
                            "Stopped container due to limit violations: {}",
                            summary
                        );
                        ActionTaken::Stopped
                    }
                    Err(e) => {
                        tracing::error!(container_id = %container_id, "Failed to stop container: {}", e);
                        ActionTaken::StopFailed
                    }
                }
            }
            EnforceAction::Kill => match self.runtime.kill_container(container_id).await {
                Ok(()) => {
                    tracing::warn!(
                        container_id = %container_id,
                        "Killed container due to limit violations: {}",
                        summary
                    );
                    ActionTaken::Killed
                }
                Err(e) => {
                    tracing::error!(container_id = %container_id, "Failed to kill container: {}", e);
                    ActionTaken::KillFailed
                }
            },
        }
    }

    /// Stop or kill containers that have stayed over their limits for
    /// `min_duration` or have accumulated `max_violation_count` violations.
    /// Returns the ids acted upon. Runs independently of any single
    /// `enforce` call.
    pub async fn sweep(
        &self,
        min_duration: Duration,
        max_violation_count: u64,
        action: EnforceAction,
    ) -> Result<Vec<String>> {
        if !matches!(action, EnforceAction::Stop | EnforceAction::Kill) {
            return Err(Error::invalid_input(
                "sweep action must be Stop or Kill",
            ));
        }

        let candidates: Vec<(String, String)> = {
            let tracked = self.exceeded.lock().await;
            tracked
                .iter()
                .filter_map(|(id, entry)| {
                    let over_duration = entry.first_exceeded.elapsed() >= min_duration;
                    let over_count = entry.exceeded_count >= max_violation_count;
                    if over_duration {
                        Some((
                            id.clone(),
                            format!(
                                "exceeded limits for {} seconds",
                                entry.first_exceeded.elapsed().as_secs()
                            ),
                        ))
                    } else if over_count {
                        Some((id.clone(), format!("exceeded limits {} times", entry.exceeded_count)))
                    } else {
                        None
                    }
                })
                .collect()
        };

        let mut cleaned = Vec::new();
        for (container_id, reason) in candidates {
            let result = match action {
                EnforceAction::Stop => {
                    self.runtime
                        .stop_container(&container_id, ENFORCE_STOP_TIMEOUT)
                        .await
                }
                EnforceAction::Kill => self.runtime.kill_container(&container_id).await,
                _ => unreachable!("validated above"),
            };

            match result {
                Ok(()) => {
                    tracing::info!(
                        container_id = %container_id,
                        "Swept container due to cleanup policy: {}",
                        reason
                    );
                    self.exceeded.lock().await.remove(&container_id);
                    cleaned.push(container_id);
                }
                Err(e) if e.is_not_found() => {
                    // Already gone; drop the tracked state
                    self.exceeded.lock().await.remove(&container_id);
                }
                Err(e) => {
                    tracing::error!(container_id = %container_id, "Failed to sweep container: {}", e);
                }
            }
        }

        Ok(cleaned)
    }

    /// Snapshot of the containers currently tracked as over-limit.
    pub async fn tracked(&self) -> HashMap<String, ViolationEntry> {
        self.exceeded.lock().await.clone()
    }

    /// Clear tracked state for one container, or for all of them.
    pub async fn reset_tracking(&self, container_id: Option<&str>) {
        let mut tracked = self.exceeded.lock().await;
        match container_id {
            Some(id) => {
                tracked.remove(id);
            }
            None => tracked.clear(),
        }
    }
}

/// Derive user-facing stats from two consecutive cumulative samples.
fn derive_stats(raw: &RuntimeStats) -> ContainerStats {
    let cpu_delta = raw.cpu.total_usage.saturating_sub(raw.precpu.total_usage);
    let system_delta = raw.cpu.system_usage.saturating_sub(raw.precpu.system_usage);

    let mut cpu_percent = 0.0;
    if cpu_delta > 0 && system_delta > 0 {
        let cores = raw.cpu.online_cpus.max(1) as f64;
        cpu_percent = (cpu_delta as f64 / system_delta as f64) * cores * 100.0;
        cpu_percent = cpu_percent.clamp(0.0, 100.0);
    }

    let memory_percent = if raw.memory_limit > 0 {
        (raw.memory_usage as f64 / raw.memory_limit as f64) * 100.0
    } else {
        0.0
    };

    ContainerStats {
        cpu_percent: round2(cpu_percent),
        memory_usage: raw.memory_usage,
        memory_limit: raw.memory_limit,
        memory_percent: round2(memory_percent),
        network_rx: raw.network_rx,
        network_tx: raw.network_tx,
        pids: raw.pids,
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::CpuSample;

    #[test]
    fn test_cpu_percent_from_sample_pair() {
        // 50% of one core over the sampling window
        let raw = RuntimeStats {
            cpu: CpuSample {
                total_usage: 1_500_000_000,
                system_usage: 3_000_000_000,
                online_cpus: 1,
            },
            precpu: CpuSample {
                total_usage: 1_000_000_000,
                system_usage: 2_000_000_000,
                online_cpus: 1,
            },
            ..Default::default()
        };
        assert_eq!(derive_stats(&raw).cpu_percent, 50.0);
    }

    #[test]
    fn test_cpu_percent_clamped() {
        let raw = RuntimeStats {
            cpu: CpuSample {
                total_usage: 10_000_000_000,
                system_usage: 2_000_000_001,
                online_cpus: 4,
            },
            precpu: CpuSample {
                total_usage: 0,
                system_usage: 2_000_000_000,
                online_cpus: 4,
            },
            ..Default::default()
        };
        assert_eq!(derive_stats(&raw).cpu_percent, 100.0);
    }

    #[test]
    fn test_cpu_percent_zero_without_deltas() {
        assert_eq!(derive_stats(&RuntimeStats::default()).cpu_percent, 0.0);
    }

    #[test]
    fn test_memory_percent() {
        let raw = RuntimeStats {
            memory_usage: 256 * 1024 * 1024,
            memory_limit: 512 * 1024 * 1024,
            ..Default::default()
        };
        let stats = derive_stats(&raw);
        assert_eq!(stats.memory_percent, 50.0);

        let unlimited = RuntimeStats {
            memory_usage: 256,
            memory_limit: 0,
            ..Default::default()
        };
        assert_eq!(derive_stats(&unlimited).memory_percent, 0.0);
    }
}
