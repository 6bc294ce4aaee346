use std::fmt;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Tool invocation as received from the LLM layer. Immutable once dispatched.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCallRequest {
    #[must_use]
    pub fn new(name: &str, arguments: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            name: name.to_owned(),
            arguments,
        }
    }
}

/// Failure category reported to the conversation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    UserError,
    PermissionError,
    SecurityError,
    SystemError,
}

/// Structured result returned for every tool call. Every failure category is
/// converted into a `ToolResult` at the orchestrator boundary; the orchestrator
/// never raises for a single call's failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        rename = "error_type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub non_truncatable: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ToolResult {
    #[must_use]
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            tool_name: String::new(),
            content: Some(content.into()),
            error: None,
            error_kind: None,
            non_truncatable: false,
            extra: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            tool_name: String::new(),
            content: None,
            error: Some(message.into()),
            error_kind: Some(kind),
            non_truncatable: false,
            extra: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra.insert(key.to_owned(), value);
        self
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.content, &self.error) {
            (Some(content), _) => f.write_str(content),
            (None, Some(error)) => f.write_str(error),
            (None, None) => f.write_str("(no output)"),
        }
    }
}

/// Errors raised inside tool handlers. The orchestrator converts these into
/// failed `ToolResult`s; they never escape a batch.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid tool parameters: {message}")]
    InvalidParams { message: String },

    #[error("path not allowed by sandbox: {path}")]
    SandboxViolation { path: String },

    #[error("command timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("execution failed: {0}")]
    Execution(#[from] std::io::Error),
}

impl ToolError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParams { .. } => ErrorKind::UserError,
            Self::SandboxViolation { .. } => ErrorKind::SecurityError,
            Self::Timeout { .. } | Self::Execution(_) => ErrorKind::SystemError,
        }
    }
}

/// Object-safe async tool backend. Boxed-future shape so descriptors can hold
/// heterogeneous handlers behind `Arc<dyn ToolHandler>`.
pub trait ToolHandler: Send + Sync {
    fn run(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send + '_>>;
}

/// Deserialize tool call arguments into a typed params struct.
///
/// # Errors
///
/// Returns `ToolError::InvalidParams` when deserialization fails.
pub fn deserialize_params<T: serde::de::DeserializeOwned>(
    arguments: &serde_json::Map<String, serde_json::Value>,
) -> Result<T, ToolError> {
    serde_json::from_value(serde_json::Value::Object(arguments.clone())).map_err(|e| {
        ToolError::InvalidParams {
            message: e.to_string(),
        }
    })
}
