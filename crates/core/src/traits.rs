//! Shared trait seams.

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A named, capability-scoped operation invocable inside a sandbox.
///
/// Tool instances are scoped to one sandbox workspace at construction time;
/// `execute` takes a JSON argument object and returns the tool's raw result
/// value (string, array, object). Containment of file paths is the tool's
/// responsibility, via [`crate::fs_policy`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (e.g. `read_file`).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value) -> Result<Value>;
}
