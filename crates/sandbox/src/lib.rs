//! Sandbox isolation subsystem for Skillbox.
//!
//! Turns a [`skillbox_core::SkillDefinition`] into a running, isolated
//! execution environment and routes tool invocations into it. Two
//! interchangeable backends provide isolation:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  SandboxBuilder (facade)                    │
//! │    ↓                                        │
//! ├─────────────────────────────────────────────┤
//! │  SandboxManager (registry, tool routing)    │
//! │    ↓ directory mode   ↓ container mode      │
//! ├──────────────────┬──────────────────────────┤
//! │ EnvironmentBuilder│ ContainerEnvironmentBuilder
//! │ (dirs + venv)    │  = ImageBuilder          │
//! │ in-process tools │  + ContainerManager      │
//! │                  │  + ContainerToolExecutor │
//! ├──────────────────┴──────────────────────────┤
//! │  ContainerRuntime boundary (narrow trait)   │
//! │    DockerRuntime (bollard) / FakeRuntime    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The [`ResourceManager`] polls per-container statistics against configured
//! limits and applies escalating enforcement actions.

pub mod builder;
pub mod config;
pub mod container;
pub mod container_env;
pub mod docker;
pub mod environment;
pub mod executor;
pub mod image;
pub mod manager;
pub mod metadata;
pub mod mocks;
pub mod resources;
pub mod runtime;

pub use builder::SandboxBuilder;
pub use config::{ContainerConfig, NetworkMode, ResourceLimits, Ulimit};
pub use container::ContainerManager;
pub use container_env::ContainerEnvironmentBuilder;
pub use docker::DockerRuntime;
pub use environment::EnvironmentBuilder;
pub use executor::ContainerToolExecutor;
pub use image::ImageBuilder;
pub use manager::{IsolationMode, SandboxInfo, SandboxManager, SandboxStatus};
pub use mocks::FakeRuntime;
pub use resources::{ContainerStats, EnforceAction, EnforcementReport, ResourceManager};
pub use runtime::{ContainerRuntime, ContainerSpec, ExecOutput, ImageLookup, RuntimeStats};
