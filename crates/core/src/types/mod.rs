//! Shared data types.

pub mod skill;
pub mod tool;

pub use skill::{EnvironmentRequirements, SkillDefinition, ToolKind, ToolSpec};
pub use tool::{EnvelopeError, ToolResultEnvelope};
