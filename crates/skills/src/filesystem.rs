//! Built-in filesystem tools.
//!
//! Each tool is scoped to one sandbox workspace root at construction time.
//! Every path argument is resolved through [`skillbox_core::fs_policy`]
//! before touching the filesystem, so operations cannot escape the
//! workspace via `../` traversal or absolute paths.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;

use skillbox_core::{fs_policy, Error, Result, Tool};

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    match args.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.as_str()),
        _ => Err(Error::invalid_input(format!(
            "Missing or invalid '{}' parameter",
            key
        ))),
    }
}

// =============================================================================
// Read File Tool
// =============================================================================

/// Read the content of a file inside the sandbox workspace.
pub struct ReadFileTool {
    workspace_root: PathBuf,
}

impl ReadFileTool {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read content from a file in the sandbox workspace"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "File path relative to the workspace root"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let file_path = required_str(&args, "file_path")?;
        let target = fs_policy::resolve_within_root(&self.workspace_root, file_path)?;

        let meta = tokio::fs::metadata(&target).await.map_err(|_| {
            Error::tool_execution(format!("File not found: {}", target.display()))
        })?;
        if !meta.is_file() {
            return Err(Error::tool_execution(format!(
                "Path is not a file: {}",
                target.display()
            )));
        }

        let content = tokio::fs::read_to_string(&target).await.map_err(|e| {
            Error::tool_execution(format!("Cannot read file {}: {}", target.display(), e))
        })?;

        Ok(Value::String(content))
    }
}

// =============================================================================
// Write File Tool
// =============================================================================

/// Write content to a file inside the sandbox workspace, creating parent
/// directories as needed.
pub struct WriteFileTool {
    workspace_root: PathBuf,
}

impl WriteFileTool {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the sandbox workspace"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "File path relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "The file content to write"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let file_path = required_str(&args, "file_path")?;
        let content = match args.get("content") {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(Error::invalid_input("Missing or invalid 'content' parameter")),
        };

        let target = fs_policy::resolve_within_root(&self.workspace_root, file_path)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::tool_execution(format!(
                    "Cannot create parent directories for {}: {}",
                    target.display(),
                    e
                ))
            })?;
        }

        tokio::fs::write(&target, content.as_bytes())
            .await
            .map_err(|e| {
                Error::tool_execution(format!("Cannot write file {}: {}", target.display(), e))
            })?;

        tracing::debug!(path = %target.display(), bytes = content.len(), "Wrote workspace file");

        Ok(json!({
            "success": true,
            "file_path": target.to_string_lossy(),
            "bytes_written": content.len(),
        }))
    }
}

// =============================================================================
// List Files Tool
// =============================================================================

/// List entries of a directory inside the sandbox workspace.
pub struct ListFilesTool {
    workspace_root: PathBuf,
}

impl ListFilesTool {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories in a sandbox workspace directory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory_path": {
                    "type": "string",
                    "description": "Directory path relative to the workspace root (default: '.')",
                    "default": "."
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let directory_path = match args.get("directory_path") {
            None | Some(Value::Null) => ".",
            Some(Value::String(s)) => s.as_str(),
            Some(_) => {
                return Err(Error::invalid_input(
                    "Invalid 'directory_path' parameter",
                ))
            }
        };

        let target = fs_policy::resolve_within_root(&self.workspace_root, directory_path)?;

        let meta = tokio::fs::metadata(&target).await.map_err(|_| {
            Error::tool_execution(format!("Directory not found: {}", target.display()))
        })?;
        if !meta.is_dir() {
            return Err(Error::tool_execution(format!(
                "Path is not a directory: {}",
                target.display()
            )));
        }

        let mut entries = tokio::fs::read_dir(&target).await.map_err(|e| {
            Error::tool_execution(format!(
                "Cannot list directory {}: {}",
                target.display(),
                e
            ))
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Error::Io)? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        Ok(json!(names))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn workspace() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("workspace");
        tokio::fs::create_dir_all(&root).await.unwrap();
        (dir, root)
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let (_guard, root) = workspace().await;
        let write = WriteFileTool::new(&root);
        let read = ReadFileTool::new(&root);

        let out = write
            .execute(json!({"file_path": "out.txt", "content": "hello"}))
            .await
            .unwrap();
        assert_eq!(out["success"], json!(true));
        assert_eq!(out["bytes_written"], json!(5));

        let content = read
            .execute(json!({"file_path": "out.txt"}))
            .await
            .unwrap();
        assert_eq!(content, json!("hello"));
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let (_guard, root) = workspace().await;
        let write = WriteFileTool::new(&root);

        let out = write
            .execute(json!({"file_path": "src/deep/main.py", "content": "print()"}))
            .await
            .unwrap();
        assert_eq!(out["success"], json!(true));
        assert!(root.join("src/deep/main.py").exists());
    }

    #[tokio::test]
    async fn test_traversal_is_rejected_without_touching_fs() {
        let (_guard, root) = workspace().await;
        let write = WriteFileTool::new(&root);
        let read = ReadFileTool::new(&root);
        let list = ListFilesTool::new(&root);

        let err = write
            .execute(json!({"file_path": "../evil.txt", "content": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SecurityViolation(_)));
        assert!(!root.parent().unwrap().join("evil.txt").exists());

        assert!(read
            .execute(json!({"file_path": "/etc/passwd"}))
            .await
            .is_err());
        assert!(list
            .execute(json!({"directory_path": "../.."}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_files_sorted() {
        let (_guard, root) = workspace().await;
        let write = WriteFileTool::new(&root);
        let list = ListFilesTool::new(&root);

        for name in ["b.txt", "a.txt", "c.txt"] {
            write
                .execute(json!({"file_path": name, "content": ""}))
                .await
                .unwrap();
        }

        let out = list.execute(json!({})).await.unwrap();
        assert_eq!(out, json!(["a.txt", "b.txt", "c.txt"]));
    }

    #[tokio::test]
    async fn test_read_missing_file_errors() {
        let (_guard, root) = workspace().await;
        let read = ReadFileTool::new(&root);
        let err = read
            .execute(json!({"file_path": "nope.txt"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
