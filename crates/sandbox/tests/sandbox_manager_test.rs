//! Directory-mode sandbox integration tests.
//!
//! Full pipeline on a real temporary directory: skill → SandboxManager →
//! workspace tools. No Docker required — directory isolation runs tools
//! in-process against the sandbox workspace.

use serde_json::json;

use skillbox_core::{Error, SkillDefinition, ToolKind, ToolSpec};
use skillbox_sandbox::{IsolationMode, SandboxBuilder, SandboxManager, SandboxStatus};

// =============================================================================
// Helpers
// =============================================================================

fn file_skill() -> SkillDefinition {
    SkillDefinition::new("file-helper", "Reads and writes files", "You manage files.")
        .unwrap()
        .with_tool(ToolSpec::new("read_file", ToolKind::Filesystem, "Read a file").unwrap())
        .with_tool(ToolSpec::new("write_file", ToolKind::Filesystem, "Write a file").unwrap())
}

// =============================================================================
// 1. End-to-end: create → write → read → list_tools → cleanup
// =============================================================================

#[tokio::test]
async fn test_directory_sandbox_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SandboxManager::directory(dir.path());

    let id = manager.create_sandbox(&file_skill(), None).await.unwrap();

    let written = manager
        .execute_tool(&id, "write_file", json!({"file_path": "out.txt", "content": "hello"}))
        .await
        .unwrap();
    assert_eq!(written["success"], json!(true));
    assert_eq!(written["bytes_written"], json!(5));

    let content = manager
        .execute_tool(&id, "read_file", json!({"file_path": "out.txt"}))
        .await
        .unwrap();
    assert_eq!(content, json!("hello"));

    let tools = manager.list_tools(&id).await.unwrap();
    assert!(tools.contains(&"read_file".to_string()));
    assert!(tools.contains(&"write_file".to_string()));

    let info = manager.get_sandbox(&id).await.unwrap();
    assert_eq!(info.skill_name, "file-helper");
    assert_eq!(info.isolation_mode, IsolationMode::Directory);
    assert_eq!(info.status, SandboxStatus::Active);
    assert!(info.container_id.is_none());
    assert!(info.workspace_path.is_dir());
    assert!(info.sandbox_path.join("metadata.json").is_file());

    assert!(manager.cleanup_sandbox(&id).await.unwrap());
    assert!(manager.get_sandbox(&id).await.is_none());
    assert!(!info.sandbox_path.exists());
    // Second cleanup of the same id returns false, not an error
    assert!(!manager.cleanup_sandbox(&id).await.unwrap());
}

// =============================================================================
// 2. Sandbox isolation: same path, different contents
// =============================================================================

#[tokio::test]
async fn test_sandboxes_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SandboxManager::directory(dir.path());

    let x = manager.create_sandbox(&file_skill(), None).await.unwrap();
    let y = manager.create_sandbox(&file_skill(), None).await.unwrap();
    assert_ne!(x, y, "sandbox ids are never reused");

    manager
        .execute_tool(&x, "write_file", json!({"file_path": "f", "content": "A"}))
        .await
        .unwrap();
    manager
        .execute_tool(&y, "write_file", json!({"file_path": "f", "content": "B"}))
        .await
        .unwrap();

    let from_x = manager
        .execute_tool(&x, "read_file", json!({"file_path": "f"}))
        .await
        .unwrap();
    let from_y = manager
        .execute_tool(&y, "read_file", json!({"file_path": "f"}))
        .await
        .unwrap();

    assert_eq!(from_x, json!("A"));
    assert_eq!(from_y, json!("B"));
}

// =============================================================================
// 3. Path containment
// =============================================================================

#[tokio::test]
async fn test_path_containment_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SandboxManager::directory(dir.path());
    let id = manager.create_sandbox(&file_skill(), None).await.unwrap();

    for path in ["../escape.txt", "a/../../escape.txt", "/etc/passwd"] {
        let err = manager
            .execute_tool(&id, "write_file", json!({"file_path": path, "content": "x"}))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::SecurityViolation(_)),
            "{} should be a containment error, got: {}",
            path,
            err
        );
    }

    assert!(manager
        .execute_tool(&id, "read_file", json!({"file_path": "../../etc/hostname"}))
        .await
        .is_err());
    assert!(manager
        .execute_tool(&id, "list_files", json!({"directory_path": ".."}))
        .await
        .is_err());

    // Nothing leaked outside the workspace
    assert!(!dir.path().join("escape.txt").exists());
}

// =============================================================================
// 4. Precondition errors
// =============================================================================

#[tokio::test]
async fn test_unknown_tool_and_unknown_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SandboxManager::directory(dir.path());
    let id = manager.create_sandbox(&file_skill(), None).await.unwrap();

    let err = manager
        .execute_tool(&id, "launch_rockets", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ToolNotFound(_)));

    let err = manager
        .execute_tool("no-such-sandbox", "read_file", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SandboxNotFound(_)));
}

// =============================================================================
// 5. cleanup_all drains the registry
// =============================================================================

#[tokio::test]
async fn test_cleanup_all() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SandboxManager::directory(dir.path());

    for _ in 0..3 {
        manager.create_sandbox(&file_skill(), None).await.unwrap();
    }
    assert_eq!(manager.sandbox_ids().await.len(), 3);

    assert_eq!(manager.cleanup_all().await, 3);
    assert!(manager.sandbox_ids().await.is_empty());
}

// =============================================================================
// 6. Facade: SKILL.md file → sandbox
// =============================================================================

#[tokio::test]
async fn test_builder_from_skill_file() {
    let dir = tempfile::tempdir().unwrap();
    let skill_path = dir.path().join("SKILL.md");
    tokio::fs::write(
        &skill_path,
        "# Note Taker\n\n\
         ## Description\n\nKeeps notes in files.\n\n\
         ## System Prompt\n\nYou keep notes.\n\n\
         ## Tools\n\n- write_file: Write a note\n- read_file: Read a note\n",
    )
    .await
    .unwrap();

    let builder = SandboxBuilder::directory(dir.path().join("sandboxes"));
    let id = builder
        .build_from_skill_file(&skill_path, None)
        .await
        .unwrap();

    let info = builder.sandbox_info(&id).await.unwrap();
    assert_eq!(info.skill_name, "Note Taker");

    builder
        .execute_tool(&id, "write_file", json!({"file_path": "note.md", "content": "remember"}))
        .await
        .unwrap();
    let read_back = builder
        .execute_tool(&id, "read_file", json!({"file_path": "note.md"}))
        .await
        .unwrap();
    assert_eq!(read_back, json!("remember"));

    assert_eq!(builder.cleanup_all().await, 1);
}
