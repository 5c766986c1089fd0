//! In-container tool execution.
//!
//! Runs tool invocations inside sandbox containers without shipping host
//! code into them. Every skill image carries a fixed, versioned, stdlib-only
//! executor program (`toolexec.py`); the host sends one JSON request per
//! invocation and decodes the single JSON envelope line the program prints.
//! The executor re-implements the workspace containment check because host
//! code cannot be imported inside the container.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use skillbox_core::{Error, Result, ToolResultEnvelope};

use crate::container::ContainerManager;

/// Source of the in-container executor program, shipped into every image.
pub const TOOLEXEC_SOURCE: &str = include_str!("executor/toolexec.py");

/// Where the executor program lives inside skill images.
pub const TOOLEXEC_CONTAINER_PATH: &str = "/opt/skillbox/toolexec.py";

/// Version of the request/response protocol spoken with the executor.
pub const TOOLEXEC_PROTOCOL_VERSION: u32 = 1;

/// Default per-invocation timeout.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// The closed set of tools executable inside containers.
const SUPPORTED_TOOLS: &[&str] = &["list_files", "read_file", "write_file"];

/// Executes tools inside sandbox containers via the runtime's exec facility.
pub struct ContainerToolExecutor {
    containers: Arc<ContainerManager>,
    default_timeout: Duration,
}

impl ContainerToolExecutor {
    pub fn new(containers: Arc<ContainerManager>) -> Self {
        Self {
            containers,
            default_timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }

    /// Override the default per-invocation timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Names of the tools supported in containers, sorted.
    pub fn supported_tools() -> Vec<String> {
        SUPPORTED_TOOLS.iter().map(|s| s.to_string()).collect()
    }

    /// Whether a tool can be executed inside containers.
    pub fn is_supported(tool_name: &str) -> bool {
        SUPPORTED_TOOLS.contains(&tool_name)
    }

    /// Execute a tool inside a container and return its result value.
    pub async fn execute(
        &self,
        container_id: &str,
        tool_name: &str,
        args: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if !Self::is_supported(tool_name) {
            return Err(Error::tool_not_found(format!(
                "{} (available tools: {})",
                tool_name,
                SUPPORTED_TOOLS.join(", ")
            )));
        }

        let request = json!({
            "version": TOOLEXEC_PROTOCOL_VERSION,
            "tool": tool_name,
            "args": args,
        });

        let command = vec![
            "python3".to_string(),
            TOOLEXEC_CONTAINER_PATH.to_string(),
            request.to_string(),
        ];

        let output = self
            .containers
            .exec(
                container_id,
                &command,
                timeout.unwrap_or(self.default_timeout),
            )
            .await?;

        if let Some(error) = &output.error {
            return Err(Error::tool_execution(format!(
                "Container execution error: {}\nstdout: {}\nstderr: {}",
                error, output.stdout, output.stderr
            )));
        }

        if output.exit_code != 0 {
            return Err(Error::tool_execution(format!(
                "Tool execution failed with exit code {}.\nstdout: {}\nstderr: {}",
                output.exit_code, output.stdout, output.stderr
            )));
        }

        let stdout = output.stdout.trim();
        if stdout.is_empty() {
            return Err(Error::protocol(format!(
                "Tool execution produced no output. stderr: {}",
                output.stderr
            )));
        }

        let envelope: ToolResultEnvelope = serde_json::from_str(stdout).map_err(|e| {
            Error::protocol(format!(
                "Failed to parse tool output as envelope: {}. Output: {:.200}",
                e, stdout
            ))
        })?;

        envelope.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::FakeRuntime;
    use crate::runtime::ExecOutput;

    async fn executor_with_running_container() -> (Arc<FakeRuntime>, ContainerToolExecutor) {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.insert_running_container("ctr-1").await;
        let dir = std::env::temp_dir();
        let containers = Arc::new(ContainerManager::new(runtime.clone(), dir));
        (runtime, ContainerToolExecutor::new(containers))
    }

    fn envelope_output(body: &str) -> ExecOutput {
        ExecOutput {
            exit_code: 0,
            stdout: format!("{}\n", body),
            stderr: String::new(),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_unsupported_tool_rejected_before_exec() {
        let (runtime, executor) = executor_with_running_container().await;
        let err = executor
            .execute("ctr-1", "teleport", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
        assert!(runtime.exec_log().await.is_empty(), "no runtime call issued");
    }

    #[tokio::test]
    async fn test_request_shape() {
        let (runtime, executor) = executor_with_running_container().await;
        runtime
            .push_exec_result(envelope_output(r#"{"success": true, "result": "hi"}"#))
            .await;

        executor
            .execute("ctr-1", "read_file", json!({"file_path": "a.txt"}), None)
            .await
            .unwrap();

        let log = executor_log(&runtime).await;
        assert_eq!(log[0], "python3");
        assert_eq!(log[1], TOOLEXEC_CONTAINER_PATH);
        let request: Value = serde_json::from_str(&log[2]).unwrap();
        assert_eq!(request["version"], json!(TOOLEXEC_PROTOCOL_VERSION));
        assert_eq!(request["tool"], json!("read_file"));
        assert_eq!(request["args"]["file_path"], json!("a.txt"));
    }

    async fn executor_log(runtime: &FakeRuntime) -> Vec<String> {
        runtime.exec_log().await.remove(0).1
    }

    #[tokio::test]
    async fn test_success_envelope_returns_result() {
        let (runtime, executor) = executor_with_running_container().await;
        runtime
            .push_exec_result(envelope_output(
                r#"{"success": true, "result": {"bytes_written": 5}}"#,
            ))
            .await;

        let result = executor
            .execute(
                "ctr-1",
                "write_file",
                json!({"file_path": "o.txt", "content": "hello"}),
                None,
            )
            .await
            .unwrap();
        assert_eq!(result["bytes_written"], json!(5));
    }

    #[tokio::test]
    async fn test_failure_envelope_raises_with_kind() {
        let (runtime, executor) = executor_with_running_container().await;
        runtime
            .push_exec_result(envelope_output(
                r#"{"success": false, "error": {"message": "File not found: /workspace/x", "kind": "FileNotFoundError", "trace": ""}}"#,
            ))
            .await;

        let err = executor
            .execute("ctr-1", "read_file", json!({"file_path": "x"}), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("FileNotFoundError"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_fatal() {
        let (runtime, executor) = executor_with_running_container().await;
        runtime
            .push_exec_result(ExecOutput {
                exit_code: 137,
                stdout: String::new(),
                stderr: "killed".into(),
                error: None,
            })
            .await;

        let err = executor
            .execute("ctr-1", "read_file", json!({"file_path": "x"}), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit code 137"));
    }

    #[tokio::test]
    async fn test_empty_stdout_is_protocol_violation() {
        let (runtime, executor) = executor_with_running_container().await;
        runtime.push_exec_result(ExecOutput::default()).await;

        let err = executor
            .execute("ctr-1", "list_files", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_protocol_violation() {
        let (runtime, executor) = executor_with_running_container().await;
        runtime
            .push_exec_result(envelope_output("this is not json"))
            .await;

        let err = executor
            .execute("ctr-1", "list_files", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_runtime_reported_error_is_fatal() {
        let (runtime, executor) = executor_with_running_container().await;
        runtime
            .push_exec_result(ExecOutput {
                exit_code: -1,
                stdout: String::new(),
                stderr: String::new(),
                error: Some("Execution timed out after 30s".into()),
            })
            .await;

        let err = executor
            .execute("ctr-1", "read_file", json!({"file_path": "x"}), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_executor_source_is_shipped() {
        assert!(TOOLEXEC_SOURCE.contains("PROTOCOL_VERSION = 1"));
        assert!(TOOLEXEC_SOURCE.contains("relative_to(WORKSPACE)"));
        for tool in ["read_file", "write_file", "list_files"] {
            assert!(ContainerToolExecutor::is_supported(tool));
            assert!(TOOLEXEC_SOURCE.contains(&format!("def {}(", tool)));
        }
    }
}
