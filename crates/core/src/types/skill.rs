//! Skill definition data model.
//!
//! A skill is a declarative description of a subagent: what it does, which
//! tools it needs, and which environment it must run in. Parsed from a
//! `SKILL.md` file by the skill parser; immutable once constructed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Category of a tool declared by a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Filesystem,
    WebSearch,
    CodebaseSearch,
    CodeExecution,
    Database,
    Custom,
}

impl ToolKind {
    /// Infer a tool kind from a tool name.
    pub fn infer(tool_name: &str) -> Self {
        let name = tool_name.to_lowercase();

        // Codebase search first: "codebase_search" also contains "search"
        if name.contains("codebase") || name.contains("code_search") {
            Self::CodebaseSearch
        } else if ["read", "write", "file", "list", "directory", "dir"]
            .iter()
            .any(|kw| name.contains(kw))
        {
            Self::Filesystem
        } else if ["web", "fetch", "url", "http"]
            .iter()
            .any(|kw| name.contains(kw))
            || name.contains("search")
        {
            Self::WebSearch
        } else if ["execute", "run", "exec", "eval"]
            .iter()
            .any(|kw| name.contains(kw))
        {
            Self::CodeExecution
        } else if ["database", "db", "query", "sql"]
            .iter()
            .any(|kw| name.contains(kw))
        {
            Self::Database
        } else {
            Self::Custom
        }
    }
}

/// A tool declared by a skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub kind: ToolKind,
    pub description: String,
    /// JSON Schema for the tool's arguments, if declared.
    #[serde(default)]
    pub parameters: Value,
}

impl ToolSpec {
    /// Create a tool spec, validating that name and description are set.
    pub fn new(
        name: impl Into<String>,
        kind: ToolKind,
        description: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let description = description.into();
        if name.is_empty() {
            return Err(Error::invalid_input("Tool name cannot be empty"));
        }
        if description.is_empty() {
            return Err(Error::invalid_input("Tool description cannot be empty"));
        }
        Ok(Self {
            name,
            kind,
            description,
            parameters: Value::Null,
        })
    }
}

/// Environment a skill's sandbox must provide.
///
/// All fields optional; an empty requirements block means a bare workspace
/// with no interpreter environment or packages provisioned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRequirements {
    /// Interpreter version (e.g. "3.11").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_version: Option<String>,

    /// Packages to install into the environment.
    #[serde(default)]
    pub packages: Vec<String>,

    /// System packages to install into container images.
    #[serde(default)]
    pub system_packages: Vec<String>,
}

impl EnvironmentRequirements {
    pub fn is_empty(&self) -> bool {
        self.python_version.is_none() && self.packages.is_empty() && self.system_packages.is_empty()
    }
}

/// A complete skill/subagent definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub environment: EnvironmentRequirements,
    /// Free-form metadata (source path, format, extra frontmatter keys).
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl SkillDefinition {
    /// Create a skill definition, validating the required fields.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let description = description.into();
        let system_prompt = system_prompt.into();
        if name.is_empty() {
            return Err(Error::invalid_input("Skill name cannot be empty"));
        }
        if description.is_empty() {
            return Err(Error::invalid_input("Skill description cannot be empty"));
        }
        if system_prompt.is_empty() {
            return Err(Error::invalid_input("System prompt cannot be empty"));
        }
        Ok(Self {
            name,
            description,
            system_prompt,
            tools: Vec::new(),
            environment: EnvironmentRequirements::default(),
            metadata: serde_json::Map::new(),
        })
    }

    /// Add a declared tool.
    pub fn with_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    /// Set the environment requirements.
    pub fn with_environment(mut self, environment: EnvironmentRequirements) -> Self {
        self.environment = environment;
        self
    }

    /// Names of all declared tools, in declaration order.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    /// Look up a declared tool by name.
    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }
}
