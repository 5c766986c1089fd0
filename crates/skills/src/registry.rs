//! Tool registry.
//!
//! The registry is a catalog of tool factories. Tools are instantiated per
//! sandbox, scoped to that sandbox's workspace root, so two sandboxes never
//! share a tool instance.

use dashmap::DashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use skillbox_core::{Error, Result, Tool};

use crate::filesystem::{ListFilesTool, ReadFileTool, WriteFileTool};

type ToolFactory = Box<dyn Fn(PathBuf) -> Arc<dyn Tool> + Send + Sync>;

/// Catalog of workspace-scoped tool factories.
pub struct ToolRegistry {
    tools: DashMap<String, ToolFactory>,
}

impl ToolRegistry {
    /// Create a registry pre-populated with the default filesystem tools.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry
            .register("read_file", |root| Arc::new(ReadFileTool::new(root)))
            .expect("default tool registration cannot collide");
        registry
            .register("write_file", |root| Arc::new(WriteFileTool::new(root)))
            .expect("default tool registration cannot collide");
        registry
            .register("list_files", |root| Arc::new(ListFilesTool::new(root)))
            .expect("default tool registration cannot collide");
        registry
    }

    /// Create a registry with no tools registered.
    pub fn empty() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    /// Register a tool factory under a unique name.
    pub fn register<F>(&self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(PathBuf) -> Arc<dyn Tool> + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(Error::invalid_input("Tool name cannot be empty"));
        }
        if self.tools.contains_key(name) {
            return Err(Error::invalid_input(format!(
                "Tool '{}' is already registered",
                name
            )));
        }

        tracing::debug!(tool = %name, "Registering tool");
        self.tools.insert(name.to_string(), Box::new(factory));
        Ok(())
    }

    /// Instantiate a tool scoped to the given workspace root.
    ///
    /// Returns `None` if no tool with that name is registered.
    pub fn instantiate(&self, name: &str, workspace_root: &Path) -> Option<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .map(|factory| factory(workspace_root.to_path_buf()))
    }

    /// Whether a tool with this name is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tool names, sorted.
    pub fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Remove a tool from the registry. Returns whether it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
