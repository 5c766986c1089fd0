//! Tool-result wire envelope.
//!
//! The contract between in-sandbox execution and the host: exactly one JSON
//! line on standard output, carrying either a result value or a structured
//! error. Failures travel inside the envelope; a nonzero exit code or empty
//! output is a protocol violation, not a valid "failure" result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Structured error carried inside a [`ToolResultEnvelope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub message: String,
    /// Error category (e.g. `ValueError`, `FileNotFoundError`).
    pub kind: String,
    #[serde(default)]
    pub trace: String,
}

/// The single-line JSON success/error wrapper produced by in-sandbox tool
/// execution and consumed by the host executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultEnvelope {
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<EnvelopeError>,
}

impl ToolResultEnvelope {
    /// Build a success envelope.
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build a failure envelope.
    pub fn err(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(EnvelopeError {
                message: message.into(),
                kind: kind.into(),
                trace: String::new(),
            }),
        }
    }

    /// Unwrap the envelope into the tool result, or an error carrying the
    /// decoded kind/message/trace.
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }

        match self.error {
            Some(err) => {
                let mut full = format!("{}: {}", err.kind, err.message);
                if !err.trace.is_empty() {
                    full.push('\n');
                    full.push_str(&err.trace);
                }
                Err(Error::tool_execution(full))
            }
            None => Err(Error::protocol(
                "Failure envelope carries no error description",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_round_trip() {
        let envelope: ToolResultEnvelope =
            serde_json::from_str(r#"{"success": true, "result": "hello"}"#).unwrap();
        assert_eq!(envelope.into_result().unwrap(), json!("hello"));
    }

    #[test]
    fn test_failure_envelope_carries_kind_and_message() {
        let envelope = ToolResultEnvelope::err("file missing", "FileNotFoundError");
        let err = envelope.into_result().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("FileNotFoundError"));
        assert!(text.contains("file missing"));
    }

    #[test]
    fn test_failure_without_error_block_is_protocol_error() {
        let envelope: ToolResultEnvelope =
            serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(matches!(
            envelope.into_result().unwrap_err(),
            Error::Protocol(_)
        ));
    }
}
