use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use warden_core::ToolOrchestrator;
use warden_tools::builtin_registry;
use warden_tools::config::GatewayConfig;
use warden_tools::executor::ToolCallRequest;
use warden_tools::security::PathPolicy;

mod prompt;

use prompt::CliConfirmationProvider;

const CONFIG_FILE: &str = "warden.toml";

fn load_config() -> anyhow::Result<GatewayConfig> {
    match std::fs::read_to_string(CONFIG_FILE) {
        Ok(text) => toml::from_str(&text).with_context(|| format!("parsing {CONFIG_FILE}")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GatewayConfig::default()),
        Err(e) => Err(e).with_context(|| format!("reading {CONFIG_FILE}")),
    }
}

/// Capture the filesystem boundary: the current directory plus the configured
/// temp dir, both canonicalized so the lexical checks see real paths.
fn capture_policy(config: &GatewayConfig) -> anyhow::Result<PathPolicy> {
    let workspace_root = std::env::current_dir()
        .and_then(|dir| dir.canonicalize())
        .context("resolving working directory")?;
    let temp_dir = match &config.temp_dir {
        Some(dir) => dir.clone(),
        None => std::env::temp_dir().join("warden"),
    };
    std::fs::create_dir_all(&temp_dir)
        .with_context(|| format!("creating temp dir {}", temp_dir.display()))?;
    let temp_dir = temp_dir
        .canonicalize()
        .with_context(|| format!("resolving temp dir {}", temp_dir.display()))?;
    Ok(PathPolicy::new(workspace_root, temp_dir))
}

#[derive(Deserialize)]
struct BatchRequest {
    tools: Vec<ToolCallRequest>,
}

async fn handle_line(orchestrator: &mut ToolOrchestrator, line: &str) -> serde_json::Value {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return protocol_error(format!("invalid JSON: {e}")),
    };
    if value.get("tools").is_some() {
        let batch = match BatchRequest::deserialize(&value) {
            Ok(batch) => batch,
            Err(e) => return protocol_error(format!("invalid batch: {e}")),
        };
        match orchestrator.execute_many(&batch.tools).await {
            Ok(results) => serde_json::json!({ "results": results }),
            Err(err) => protocol_error(err.to_string()),
        }
    } else {
        let request = match ToolCallRequest::deserialize(&value) {
            Ok(request) => request,
            Err(e) => return protocol_error(format!("invalid tool call: {e}")),
        };
        let result = orchestrator.execute(&request).await;
        serde_json::to_value(result)
            .unwrap_or_else(|e| protocol_error(format!("serializing result: {e}")))
    }
}

fn protocol_error(message: String) -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "error": message,
        "error_type": "validation_error",
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config()?;
    let policy = capture_policy(&config)?;
    info!(
        workspace = %policy.workspace_root().display(),
        temp = %policy.temp_dir().display(),
        "boundary captured"
    );

    let registry = builtin_registry(&policy, &config).context("registering built-in tools")?;
    let mut orchestrator = ToolOrchestrator::new(
        registry,
        policy,
        &config,
        Arc::new(CliConfirmationProvider),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = handle_line(&mut orchestrator, line).await;
        let mut encoded = match serde_json::to_vec(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "failed to encode response");
                continue;
            }
        };
        encoded.push(b'\n');
        stdout
            .write_all(&encoded)
            .await
            .context("writing response")?;
        stdout.flush().await.context("flushing stdout")?;
    }
    Ok(())
}
