//! Shell command execution through `bash -c`.

use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use crate::config::ShellConfig;
use crate::executor::{
    deserialize_params, ErrorKind, ToolError, ToolHandler, ToolResult,
};
use crate::registry::{TargetShape, ToolDescriptor};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BashParams {
    /// The command line to run.
    pub command: String,
    /// Per-call timeout override, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

pub struct ShellHandler {
    default_timeout_secs: u64,
}

impl ShellHandler {
    #[must_use]
    pub fn new(config: &ShellConfig) -> Self {
        Self {
            default_timeout_secs: config.timeout_secs,
        }
    }

    #[must_use]
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            id: "bash".to_string(),
            description: "Run a shell command with bash and return its output".to_string(),
            schema: schemars::schema_for!(BashParams).to_value(),
            target_shape: TargetShape::Command("command"),
            requires_confirmation: true,
            truncatable: true,
            truncation_guidance: Some(
                "pipe long output through head, tail, or grep to narrow it".to_string(),
            ),
        }
    }

    async fn execute(&self, params: BashParams) -> Result<ToolResult, ToolError> {
        let timeout_secs = params.timeout_secs.unwrap_or(self.default_timeout_secs);
        debug!(command = %params.command, timeout_secs, "spawning shell command");

        let mut child = tokio::process::Command::new("bash")
            .arg("-c")
            .arg(&params.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        // Dropping the child on timeout kills the process via kill_on_drop.
        let wait = child.wait_with_output();
        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), wait).await {
            Ok(output) => output?,
            Err(_) => return Err(ToolError::Timeout { timeout_secs }),
        };

        let mut content = String::from_utf8_lossy(&output.stdout).into_owned();
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str("[stderr] ");
            content.push_str(line);
            content.push('\n');
        }

        if output.status.success() {
            Ok(ToolResult::ok(content))
        } else {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let mut result =
                ToolResult::failure(ErrorKind::UserError, format!("command exited with code {code}"));
            if !content.is_empty() {
                result.content = Some(content);
            }
            Ok(result)
        }
    }
}

impl ToolHandler for ShellHandler {
    fn run(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let params: BashParams = deserialize_params(&arguments)?;
            self.execute(params).await
        })
    }
}
