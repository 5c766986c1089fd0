//! Error types for Skillbox.

use thiserror::Error;

/// Result type alias using Skillbox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Skillbox.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Validation / precondition errors — raised before any external call
    // =========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Sandbox already exists: {0}")]
    DuplicateSandbox(String),

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    // =========================================================================
    // Not-found errors — distinct from runtime failures so cleanup paths
    // can tell "already gone" apart from "something is wrong"
    // =========================================================================
    #[error("Sandbox not found: {0}")]
    SandboxNotFound(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    // =========================================================================
    // Runtime / backend errors
    // =========================================================================
    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error("Image build failed: {0}")]
    ImageBuild(String),

    #[error("Environment setup failed: {0}")]
    Environment(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // =========================================================================
    // Protocol errors — malformed in-container result envelope
    // =========================================================================
    #[error("Protocol error: {0}")]
    Protocol(String),

    // =========================================================================
    // Generic errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a validation error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a security violation error.
    pub fn security_violation(msg: impl Into<String>) -> Self {
        Self::SecurityViolation(msg.into())
    }

    /// Create a container runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Create an image build error.
    pub fn image_build(msg: impl Into<String>) -> Self {
        Self::ImageBuild(msg.into())
    }

    /// Create an environment setup error.
    pub fn environment(msg: impl Into<String>) -> Self {
        Self::Environment(msg.into())
    }

    /// Create a tool execution error.
    pub fn tool_execution(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a tool not found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound(name.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error means the referenced resource does not exist.
    ///
    /// Cleanup paths treat not-found sub-errors as "already gone" rather
    /// than as failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SandboxNotFound(_)
                | Self::ContainerNotFound(_)
                | Self::ImageNotFound(_)
                | Self::ToolNotFound(_)
        )
    }
}
