//! Core types, traits, and error definitions for Skillbox.
//!
//! This crate provides the foundational building blocks shared by the skill
//! layer and the sandbox isolation subsystem: the error taxonomy, the
//! `SkillDefinition` data model, the tool-result wire envelope, and the
//! filesystem containment policy.

pub mod error;
pub mod fs_policy;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
