//! Container-mode sandbox integration tests.
//!
//! Exercise the full container path — image caching, container lifecycle,
//! executor protocol, rollback — against the in-memory FakeRuntime. No
//! Docker daemon required.

use serde_json::json;
use std::sync::Arc;

use skillbox_core::{SkillDefinition, ToolKind, ToolSpec};
use skillbox_sandbox::runtime::ExecOutput;
use skillbox_sandbox::{
    ContainerConfig, FakeRuntime, IsolationMode, NetworkMode, ResourceLimits, SandboxManager,
};

// =============================================================================
// Helpers
// =============================================================================

fn file_skill() -> SkillDefinition {
    SkillDefinition::new("file-helper", "Reads and writes files", "You manage files.")
        .unwrap()
        .with_tool(ToolSpec::new("read_file", ToolKind::Filesystem, "Read a file").unwrap())
        .with_tool(ToolSpec::new("write_file", ToolKind::Filesystem, "Write a file").unwrap())
}

fn manager(
    runtime: &Arc<FakeRuntime>,
    dir: &tempfile::TempDir,
) -> SandboxManager {
    SandboxManager::container(
        dir.path(),
        runtime.clone(),
        ContainerConfig::default(),
    )
    .unwrap()
}

// =============================================================================
// 1. Image cache: second sandbox reuses the first build
// =============================================================================

#[tokio::test]
async fn test_second_create_is_an_image_cache_hit() {
    let runtime = Arc::new(FakeRuntime::new());
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&runtime, &dir);

    let first = manager.create_sandbox(&file_skill(), None).await.unwrap();
    let second = manager.create_sandbox(&file_skill(), None).await.unwrap();

    let tag_a = manager.get_sandbox(&first).await.unwrap().image_tag.unwrap();
    let tag_b = manager.get_sandbox(&second).await.unwrap().image_tag.unwrap();

    assert_eq!(tag_a, tag_b, "identical requirements share one identity");
    assert_eq!(
        runtime.built_tags().await.len(),
        1,
        "second ensure_image performed no build"
    );
}

// =============================================================================
// 2. Tool execution routes through the in-container executor
// =============================================================================

#[tokio::test]
async fn test_execute_routes_through_executor() {
    let runtime = Arc::new(FakeRuntime::new());
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&runtime, &dir);

    let id = manager.create_sandbox(&file_skill(), None).await.unwrap();

    runtime
        .push_exec_result(ExecOutput {
            exit_code: 0,
            stdout: r#"{"success": true, "result": {"success": true, "file_path": "/workspace/out.txt", "bytes_written": 5}}"#.to_string(),
            stderr: String::new(),
            error: None,
        })
        .await;

    let result = manager
        .execute_tool(&id, "write_file", json!({"file_path": "out.txt", "content": "hello"}))
        .await
        .unwrap();
    assert_eq!(result["bytes_written"], json!(5));

    let log = runtime.exec_log().await;
    assert_eq!(log.len(), 1);
    let argv = &log[0].1;
    assert_eq!(argv[0], "python3");
    assert_eq!(argv[1], "/opt/skillbox/toolexec.py");
    let request: serde_json::Value = serde_json::from_str(&argv[2]).unwrap();
    assert_eq!(request["version"], json!(1));
    assert_eq!(request["tool"], json!("write_file"));
}

// =============================================================================
// 3. Declared-but-unsupported tools fail at call time
// =============================================================================

#[tokio::test]
async fn test_declared_custom_tool_unsupported_in_container() {
    let runtime = Arc::new(FakeRuntime::new());
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&runtime, &dir);

    let skill = file_skill()
        .with_tool(ToolSpec::new("telescope", ToolKind::Custom, "Stargaze").unwrap());
    let id = manager.create_sandbox(&skill, None).await.unwrap();

    // The declared tool is listed...
    assert!(manager
        .list_tools(&id)
        .await
        .unwrap()
        .contains(&"telescope".to_string()));

    // ...but the executor's closed set rejects it before any runtime call
    let err = manager
        .execute_tool(&id, "telescope", json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("telescope"));
    assert!(runtime.exec_log().await.is_empty());
}

// =============================================================================
// 4. Cleanup removes container and directory, idempotently
// =============================================================================

#[tokio::test]
async fn test_cleanup_tears_down_container_and_directory() {
    let runtime = Arc::new(FakeRuntime::new());
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&runtime, &dir);

    let id = manager.create_sandbox(&file_skill(), None).await.unwrap();
    let info = manager.get_sandbox(&id).await.unwrap();
    assert_eq!(info.isolation_mode, IsolationMode::Container);
    assert!(runtime.is_running(info.container_id.as_ref().unwrap()).await);

    assert!(manager.cleanup_sandbox(&id).await.unwrap());
    assert_eq!(runtime.container_count().await, 0);
    assert!(!info.sandbox_path.exists());
    assert!(manager.get_sandbox(&id).await.is_none());
    assert!(!manager.cleanup_sandbox(&id).await.unwrap());
}

// =============================================================================
// 5. Failed creation rolls back: no record, no container, no directory
// =============================================================================

#[tokio::test]
async fn test_failed_start_leaves_nothing_behind() {
    let runtime = Arc::new(FakeRuntime::new());
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&runtime, &dir);

    runtime.fail_next_start().await;
    let err = manager.create_sandbox(&file_skill(), None).await.unwrap_err();
    assert!(err.to_string().contains("file-helper"));

    assert!(manager.sandbox_ids().await.is_empty());
    assert_eq!(runtime.container_count().await, 0);
    assert!(
        std::fs::read_dir(dir.path()).unwrap().next().is_none(),
        "no sandbox directory survives the failed creation"
    );
}

// =============================================================================
// 6. Invalid configuration fails before any runtime call
// =============================================================================

#[tokio::test]
async fn test_invalid_config_rejected_eagerly() {
    let runtime = Arc::new(FakeRuntime::new());
    let dir = tempfile::tempdir().unwrap();

    let mut bad = ContainerConfig::default();
    bad.resource_limits = ResourceLimits {
        memory: Some("lots".into()),
        ..Default::default()
    };

    assert!(SandboxManager::container(dir.path(), runtime.clone(), bad).is_err());

    // Per-create override is validated the same way
    let manager = manager(&runtime, &dir);
    let mut bad = ContainerConfig::default();
    bad.working_dir = "workspace".into();
    assert!(manager
        .create_sandbox(&file_skill(), Some(&bad))
        .await
        .is_err());
    assert!(runtime.built_tags().await.is_empty(), "no build was attempted");
}

// =============================================================================
// 7. Custom network/config reaches the runtime spec
// =============================================================================

#[tokio::test]
async fn test_custom_config_is_honored() {
    let runtime = Arc::new(FakeRuntime::new());
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&runtime, &dir);

    let mut config = ContainerConfig::default();
    config.network_mode = NetworkMode::Bridge;
    config.resource_limits = ResourceLimits {
        memory: Some("256m".into()),
        cpus: Some(0.5),
        pids_limit: Some(64),
        ulimits: vec![],
    };

    let id = manager
        .create_sandbox(&file_skill(), Some(&config))
        .await
        .unwrap();

    let info = manager.get_sandbox(&id).await.unwrap();
    let metadata = tokio::fs::read_to_string(info.sandbox_path.join("metadata.json"))
        .await
        .unwrap();
    let metadata: serde_json::Value = serde_json::from_str(&metadata).unwrap();
    assert_eq!(metadata["container_config"]["network_mode"], json!("bridge"));
    assert_eq!(
        metadata["container_config"]["resource_limits"]["memory"],
        json!("256m")
    );
}
