//! Container configuration.
//!
//! [`ContainerConfig`] and [`ResourceLimits`] describe how a sandbox
//! container is created. Both validate eagerly: every creation path calls
//! [`ContainerConfig::validate`] before any runtime call is issued, so
//! invalid values never reach the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use skillbox_core::{Error, Result};

use crate::runtime::VolumeBind;

/// Docker's standard CPU scheduler period, in microseconds.
pub const CPU_PERIOD_MICROS: i64 = 100_000;

/// Network isolation mode for sandbox containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// No network access (default).
    #[default]
    None,
    /// Standard bridged networking.
    Bridge,
    /// Full access to the host network (dangerous).
    Host,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bridge => "bridge",
            Self::Host => "host",
        }
    }
}

/// One raw ulimit entry passed through to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ulimit {
    pub name: String,
    pub soft: i64,
    pub hard: i64,
}

/// Resource limits for sandbox containers.
///
/// All dimensions are optional; absence means "no limit enforced".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit as a size string (`"512m"`, `"1g"`, `"2GB"`) or raw
    /// byte count (`"536870912"`).
    pub memory: Option<String>,
    /// CPU limit as a fractional core count (e.g. `1.5`).
    pub cpus: Option<f64>,
    /// Maximum number of processes.
    pub pids_limit: Option<i64>,
    /// Raw ulimit entries.
    #[serde(default)]
    pub ulimits: Vec<Ulimit>,
}

impl ResourceLimits {
    pub fn validate(&self) -> Result<()> {
        if let Some(memory) = &self.memory {
            parse_memory_size(memory)?;
        }
        if let Some(cpus) = self.cpus {
            if !cpus.is_finite() || cpus <= 0.0 {
                return Err(Error::invalid_input("CPU limit must be positive"));
            }
        }
        if let Some(pids) = self.pids_limit {
            if pids < 1 {
                return Err(Error::invalid_input("pids_limit must be positive"));
            }
        }
        for ulimit in &self.ulimits {
            if ulimit.name.trim().is_empty() {
                return Err(Error::invalid_input("ulimit name cannot be empty"));
            }
        }
        Ok(())
    }

    /// Parsed memory limit in bytes, if one is configured.
    pub fn memory_bytes(&self) -> Result<Option<u64>> {
        self.memory
            .as_deref()
            .map(parse_memory_size)
            .transpose()
    }

    /// CPU limit translated into the runtime's quota representation, paired
    /// with the standard period.
    pub fn cpu_quota(&self) -> Option<(i64, i64)> {
        self.cpus
            .map(|cpus| ((cpus * CPU_PERIOD_MICROS as f64) as i64, CPU_PERIOD_MICROS))
    }
}

/// Parse a memory size string into bytes.
///
/// Accepts unit suffixes `b`, `k`, `kb`, `m`, `mb`, `g`, `gb`, `t`, `tb`
/// (case-insensitive, fractional values allowed) or a raw byte count.
pub fn parse_memory_size(input: &str) -> Result<u64> {
    let normalized = input.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(Error::invalid_input("Memory limit cannot be empty"));
    }

    // Two-character suffixes first so "mb" is not read as "b"
    const UNITS: &[(&str, u64)] = &[
        ("kb", 1 << 10),
        ("mb", 1 << 20),
        ("gb", 1 << 30),
        ("tb", 1 << 40),
        ("k", 1 << 10),
        ("m", 1 << 20),
        ("g", 1 << 30),
        ("t", 1 << 40),
        ("b", 1),
    ];

    for (unit, multiplier) in UNITS {
        if let Some(value) = normalized.strip_suffix(unit) {
            if let Ok(value) = value.trim().parse::<f64>() {
                if value >= 0.0 {
                    return Ok((value * *multiplier as f64) as u64);
                }
            }
        }
    }

    if let Ok(bytes) = normalized.parse::<u64>() {
        return Ok(bytes);
    }

    Err(Error::invalid_input(format!(
        "Invalid memory format: {}. Expected format: '512m', '1g', '2GB', or bytes",
        input
    )))
}

/// Configuration for sandbox containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Base image to derive skill images from.
    pub base_image: String,
    pub resource_limits: ResourceLimits,
    pub network_mode: NetworkMode,
    /// Whether the root filesystem is mounted read-only.
    pub read_only_rootfs: bool,
    /// tmpfs mount points (absolute paths).
    pub tmpfs: Vec<String>,
    pub environment_vars: HashMap<String, String>,
    /// Extra volume bindings merged after the workspace bind.
    pub volumes: Vec<VolumeBind>,
    /// Working directory inside the container (absolute path).
    pub working_dir: String,
    /// User to run as (e.g. `"sandbox:1000"`); None keeps the image default.
    pub user: Option<String>,
    pub cap_drop: Vec<String>,
    pub cap_add: Vec<String>,
    pub security_opt: Vec<String>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            base_image: "python:3.11-slim".to_string(),
            resource_limits: ResourceLimits::default(),
            network_mode: NetworkMode::None,
            read_only_rootfs: true,
            tmpfs: vec!["/tmp".to_string()],
            environment_vars: HashMap::new(),
            volumes: Vec::new(),
            working_dir: "/workspace".to_string(),
            user: None,
            cap_drop: vec!["ALL".to_string()],
            cap_add: Vec::new(),
            security_opt: vec!["no-new-privileges:true".to_string()],
        }
    }
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the full configuration. Called by every creation path before
    /// a runtime call is issued.
    pub fn validate(&self) -> Result<()> {
        if self.base_image.trim().is_empty() {
            return Err(Error::invalid_input("base_image cannot be empty"));
        }
        if self.working_dir.is_empty() {
            return Err(Error::invalid_input("working_dir cannot be empty"));
        }
        if !self.working_dir.starts_with('/') {
            return Err(Error::invalid_input(format!(
                "working_dir must be an absolute path, got: {}",
                self.working_dir
            )));
        }
        for path in &self.tmpfs {
            if !path.starts_with('/') {
                return Err(Error::invalid_input(format!(
                    "tmpfs paths must be absolute, got: {}",
                    path
                )));
            }
        }
        for cap in self.cap_drop.iter().chain(self.cap_add.iter()) {
            if cap.trim().is_empty() {
                return Err(Error::invalid_input("capabilities cannot be empty strings"));
            }
        }
        self.resource_limits.validate()
    }

    /// Validating constructor for configs assembled field-by-field.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid_and_locked_down() {
        let config = ContainerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.base_image, "python:3.11-slim");
        assert_eq!(config.network_mode, NetworkMode::None);
        assert!(config.read_only_rootfs);
        assert_eq!(config.cap_drop, vec!["ALL"]);
        assert_eq!(config.security_opt, vec!["no-new-privileges:true"]);
        assert_eq!(config.working_dir, "/workspace");
    }

    #[test]
    fn test_parse_memory_size() {
        assert_eq!(parse_memory_size("512m").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_memory_size("1g").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_size("2GB").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_memory_size("1.5k").unwrap(), 1536);
        assert_eq!(parse_memory_size("1024").unwrap(), 1024);
        assert_eq!(parse_memory_size("100b").unwrap(), 100);

        assert!(parse_memory_size("").is_err());
        assert!(parse_memory_size("lots").is_err());
        assert!(parse_memory_size("12q").is_err());
    }

    #[test]
    fn test_resource_limit_validation() {
        assert!(ResourceLimits {
            memory: Some("512m".into()),
            cpus: Some(1.5),
            pids_limit: Some(100),
            ulimits: vec![Ulimit {
                name: "nofile".into(),
                soft: 1024,
                hard: 2048
            }],
        }
        .validate()
        .is_ok());

        assert!(ResourceLimits {
            cpus: Some(0.0),
            ..Default::default()
        }
        .validate()
        .is_err());

        assert!(ResourceLimits {
            pids_limit: Some(0),
            ..Default::default()
        }
        .validate()
        .is_err());

        assert!(ResourceLimits {
            memory: Some("banana".into()),
            ..Default::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_cpu_quota_translation() {
        let limits = ResourceLimits {
            cpus: Some(1.5),
            ..Default::default()
        };
        assert_eq!(limits.cpu_quota(), Some((150_000, 100_000)));
        assert_eq!(ResourceLimits::default().cpu_quota(), None);
    }

    #[test]
    fn test_config_validation_failures() {
        let mut config = ContainerConfig::default();
        config.working_dir = "workspace".into();
        assert!(config.validate().is_err());

        let mut config = ContainerConfig::default();
        config.base_image = "  ".into();
        assert!(config.validate().is_err());

        let mut config = ContainerConfig::default();
        config.tmpfs = vec!["tmp".into()];
        assert!(config.validate().is_err());
    }
}
