//! Permission decisions for tool calls.
//!
//! Security checks always run first and cannot be overridden: a traversal
//! pattern or out-of-boundary path is denied before the trust store is even
//! consulted, so no grant can authorize attack-shaped input.

use std::path::PathBuf;
use std::pin::Pin;

use tracing::warn;

use warden_tools::executor::{ErrorKind, ToolCallRequest};
use warden_tools::registry::{TargetShape, ToolDescriptor};
use warden_tools::security::{PathPolicy, SensitivityTier, command_tier};
use warden_tools::trust::{TrustScope, TrustStore};

/// What a tool call is asking to touch, derived from its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionTarget {
    Path { raw: String, resolved: PathBuf },
    Command { command: String, outside_cwd: bool },
    /// No external target; permission covers the tool itself.
    Tool,
}

impl PermissionTarget {
    /// Stable key used for trust lookups and one-shot approvals.
    #[must_use]
    pub fn key(&self, tool_id: &str) -> String {
        match self {
            Self::Path { resolved, .. } => resolved.display().to_string(),
            Self::Command { command, .. } => command.clone(),
            Self::Tool => tool_id.to_string(),
        }
    }
}

/// The user's answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    AllowOnce,
    /// Trust this target durably: the directory for path targets, the exact
    /// command line for command targets.
    TrustTarget,
    /// Trust the tool for every target.
    TrustGlobal,
    Deny,
}

/// Everything a prompt needs to warn the user appropriately.
pub struct ConfirmationRequest<'a> {
    pub tool_id: &'a str,
    pub arguments: &'a serde_json::Map<String, serde_json::Value>,
    pub target: &'a PermissionTarget,
    /// Only computed for command targets.
    pub tier: Option<SensitivityTier>,
}

/// External UI boundary. Boxed-future shape so the orchestrator can hold any
/// provider behind `Arc<dyn ConfirmationProvider>`.
pub trait ConfirmationProvider: Send + Sync {
    fn confirm<'a>(
        &'a self,
        request: ConfirmationRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Decision> + Send + 'a>>;
}

/// Outcome of an authorization check. Denials carry the error class so the
/// caller can distinguish "attack-shaped input" from "user said no".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Denied { reason: String, kind: ErrorKind },
}

impl Authorization {
    fn security(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
            kind: ErrorKind::SecurityError,
        }
    }

    fn validation(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
            kind: ErrorKind::ValidationError,
        }
    }
}

pub struct PermissionGateway {
    policy: PathPolicy,
}

impl PermissionGateway {
    #[must_use]
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    /// Decide whether one tool call may run. Checks run in a fixed order:
    /// target derivation, the generic argument scan, the path boundary,
    /// trust lookup, and only then the interactive prompt.
    pub async fn authorize(
        &self,
        descriptor: &ToolDescriptor,
        request: &ToolCallRequest,
        trust: &mut TrustStore,
        confirm: &dyn ConfirmationProvider,
    ) -> Authorization {
        let target = match self.derive_target(descriptor, request) {
            Ok(target) => target,
            Err(denied) => return denied,
        };

        // Command strings get their own dedicated check via the sensitivity
        // tier, so they are exempt from the generic scan.
        if !matches!(target, PermissionTarget::Command { .. })
            && let Some(offending) = self.scan_arguments(&request.arguments)
        {
            warn!(
                tool = %request.name,
                argument = %offending,
                "rejecting tool call with traversal-shaped argument"
            );
            return Authorization::security(format!(
                "argument contains a traversal pattern: {offending}"
            ));
        }

        let key = target.key(&descriptor.id);
        let trusted_path = match &target {
            PermissionTarget::Path { resolved, .. } => Some(resolved.as_path()),
            _ => None,
        };
        if trust.is_trusted(&descriptor.id, &key, trusted_path) {
            return Authorization::Granted;
        }

        if !descriptor.requires_confirmation {
            return Authorization::Granted;
        }

        let tier = match &target {
            PermissionTarget::Command {
                command,
                outside_cwd,
            } => Some(command_tier(command, *outside_cwd)),
            _ => None,
        };
        let decision = confirm
            .confirm(ConfirmationRequest {
                tool_id: &descriptor.id,
                arguments: &request.arguments,
                target: &target,
                tier,
            })
            .await;

        match decision {
            Decision::AllowOnce => Authorization::Granted,
            Decision::TrustTarget => {
                trust.grant(&descriptor.id, target_scope(&target, &key));
                Authorization::Granted
            }
            Decision::TrustGlobal => {
                trust.grant(&descriptor.id, TrustScope::Global);
                Authorization::Granted
            }
            Decision::Deny => Authorization::Denied {
                reason: format!("user denied {} for {key}", descriptor.id),
                kind: ErrorKind::PermissionError,
            },
        }
    }

    fn derive_target(
        &self,
        descriptor: &ToolDescriptor,
        request: &ToolCallRequest,
    ) -> Result<PermissionTarget, Authorization> {
        match descriptor.target_shape {
            TargetShape::Command(argument) => {
                let Some(command) = string_argument(request, argument) else {
                    return Err(Authorization::validation(format!(
                        "missing required argument '{argument}'"
                    )));
                };
                // The outside-cwd heuristic reuses the traversal check; it is
                // approximate for complex shell syntax and only escalates the
                // prompt, never silently allows.
                let outside_cwd = self.policy.has_traversal_pattern(&command);
                Ok(PermissionTarget::Command {
                    command,
                    outside_cwd,
                })
            }
            TargetShape::Path(argument) => {
                let Some(raw) = string_argument(request, argument) else {
                    // Optional path argument; permission falls back to the
                    // tool itself, scoped to the workspace root.
                    return Ok(PermissionTarget::Tool);
                };
                if self.policy.has_traversal_pattern(&raw) {
                    return Err(Authorization::security(format!(
                        "path contains a traversal pattern: {raw}"
                    )));
                }
                let resolved = self.policy.resolve(&raw);
                if !self.policy.is_inside_boundary(&resolved) {
                    return Err(Authorization::security(format!(
                        "path is outside the working directory: {raw}"
                    )));
                }
                Ok(PermissionTarget::Path { raw, resolved })
            }
            TargetShape::None => Ok(PermissionTarget::Tool),
        }
    }

    /// Check every top-level string argument and string-array element.
    /// Returns the first offending value.
    fn scan_arguments(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Option<String> {
        for value in arguments.values() {
            match value {
                serde_json::Value::String(s) if self.policy.has_traversal_pattern(s) => {
                    return Some(s.clone());
                }
                serde_json::Value::Array(items) => {
                    for item in items {
                        if let serde_json::Value::String(s) = item
                            && self.policy.has_traversal_pattern(s)
                        {
                            return Some(s.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Scope recorded for a trust-target decision: the containing directory for
/// paths, the exact string for everything else.
fn target_scope(target: &PermissionTarget, key: &str) -> TrustScope {
    match target {
        PermissionTarget::Path { resolved, .. } => {
            let dir = resolved
                .parent()
                .map_or_else(|| resolved.clone(), std::path::Path::to_path_buf);
            TrustScope::Path(dir)
        }
        PermissionTarget::Command { .. } | PermissionTarget::Tool => {
            TrustScope::Target(key.to_string())
        }
    }
}

fn string_argument(request: &ToolCallRequest, name: &str) -> Option<String> {
    request
        .arguments
        .get(name)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use serde_json::json;

    use warden_tools::registry::ToolDescriptor;

    use super::*;

    /// Scripted provider: returns the next queued decision and records what
    /// it was asked.
    struct ScriptedProvider {
        decisions: Mutex<Vec<Decision>>,
        prompts: Mutex<Vec<(String, Option<SensitivityTier>)>>,
    }

    impl ScriptedProvider {
        fn new(decisions: Vec<Decision>) -> Self {
            Self {
                decisions: Mutex::new(decisions),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompt_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl ConfirmationProvider for ScriptedProvider {
        fn confirm<'a>(
            &'a self,
            request: ConfirmationRequest<'a>,
        ) -> Pin<Box<dyn Future<Output = Decision> + Send + 'a>> {
            let decision = self
                .decisions
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Decision::Deny);
            self.prompts
                .lock()
                .unwrap()
                .push((request.tool_id.to_string(), request.tier));
            Box::pin(async move { decision })
        }
    }

    fn gateway() -> PermissionGateway {
        PermissionGateway::new(PathPolicy::new(
            "/workspace/project".into(),
            "/tmp/warden".into(),
        ))
    }

    fn path_descriptor(id: &str, confirm: bool) -> ToolDescriptor {
        ToolDescriptor {
            id: id.to_string(),
            description: String::new(),
            schema: json!({"type": "object"}),
            target_shape: TargetShape::Path("file_path"),
            requires_confirmation: confirm,
            truncatable: true,
            truncation_guidance: None,
        }
    }

    fn command_descriptor() -> ToolDescriptor {
        ToolDescriptor {
            id: "bash".to_string(),
            description: String::new(),
            schema: json!({"type": "object"}),
            target_shape: TargetShape::Command("command"),
            requires_confirmation: true,
            truncatable: true,
            truncation_guidance: None,
        }
    }

    fn request(name: &str, arguments: serde_json::Value) -> ToolCallRequest {
        ToolCallRequest::new(name, arguments.as_object().cloned().unwrap())
    }

    fn denied_kind(auth: &Authorization) -> Option<ErrorKind> {
        match auth {
            Authorization::Denied { kind, .. } => Some(*kind),
            Authorization::Granted => None,
        }
    }

    #[tokio::test]
    async fn traversal_path_denied_without_prompting() {
        let gateway = gateway();
        let provider = ScriptedProvider::new(vec![Decision::AllowOnce]);
        let mut trust = TrustStore::new();
        let auth = gateway
            .authorize(
                &path_descriptor("write_file", true),
                &request("write_file", json!({"file_path": "../etc/passwd", "content": "x"})),
                &mut trust,
                &provider,
            )
            .await;
        assert_eq!(denied_kind(&auth), Some(ErrorKind::SecurityError));
        assert_eq!(provider.prompt_count(), 0);
    }

    #[tokio::test]
    async fn global_trust_cannot_launder_traversal() {
        let gateway = gateway();
        let provider = ScriptedProvider::new(vec![]);
        let mut trust = TrustStore::new();
        trust.grant("write_file", TrustScope::Global);
        let auth = gateway
            .authorize(
                &path_descriptor("write_file", true),
                &request("write_file", json!({"file_path": "../secrets", "content": "x"})),
                &mut trust,
                &provider,
            )
            .await;
        assert_eq!(denied_kind(&auth), Some(ErrorKind::SecurityError));
    }

    #[tokio::test]
    async fn path_outside_boundary_denied() {
        let gateway = gateway();
        let provider = ScriptedProvider::new(vec![]);
        let mut trust = TrustStore::new();
        let auth = gateway
            .authorize(
                &path_descriptor("write_file", true),
                &request("write_file", json!({"file_path": "/etc/cron.d/x", "content": "x"})),
                &mut trust,
                &provider,
            )
            .await;
        assert_eq!(denied_kind(&auth), Some(ErrorKind::SecurityError));
    }

    #[tokio::test]
    async fn traversal_in_non_target_argument_denied() {
        let gateway = gateway();
        let provider = ScriptedProvider::new(vec![]);
        let mut trust = TrustStore::new();
        let auth = gateway
            .authorize(
                &path_descriptor("write_file", true),
                &request(
                    "write_file",
                    json!({"file_path": "ok.txt", "content": "$(cat /etc/passwd)"}),
                ),
                &mut trust,
                &provider,
            )
            .await;
        assert_eq!(denied_kind(&auth), Some(ErrorKind::SecurityError));
        assert_eq!(provider.prompt_count(), 0);
    }

    #[tokio::test]
    async fn command_string_exempt_from_generic_scan() {
        let gateway = gateway();
        let provider = ScriptedProvider::new(vec![Decision::AllowOnce]);
        let mut trust = TrustStore::new();
        let auth = gateway
            .authorize(
                &command_descriptor(),
                &request("bash", json!({"command": "cd .. && ls"})),
                &mut trust,
                &provider,
            )
            .await;
        assert_eq!(auth, Authorization::Granted);
        // The outside-cwd heuristic escalated the prompt instead.
        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts[0].1, Some(SensitivityTier::ExtremelySensitive));
    }

    #[tokio::test]
    async fn missing_command_argument_is_validation_error() {
        let gateway = gateway();
        let provider = ScriptedProvider::new(vec![]);
        let mut trust = TrustStore::new();
        let auth = gateway
            .authorize(
                &command_descriptor(),
                &request("bash", json!({})),
                &mut trust,
                &provider,
            )
            .await;
        assert_eq!(denied_kind(&auth), Some(ErrorKind::ValidationError));
    }

    #[tokio::test]
    async fn read_only_tool_skips_prompt_after_checks() {
        let gateway = gateway();
        let provider = ScriptedProvider::new(vec![]);
        let mut trust = TrustStore::new();
        let auth = gateway
            .authorize(
                &path_descriptor("read_file", false),
                &request("read_file", json!({"file_path": "src/main.rs"})),
                &mut trust,
                &provider,
            )
            .await;
        assert_eq!(auth, Authorization::Granted);
        assert_eq!(provider.prompt_count(), 0);
    }

    #[tokio::test]
    async fn deny_decision_is_permission_error() {
        let gateway = gateway();
        let provider = ScriptedProvider::new(vec![Decision::Deny]);
        let mut trust = TrustStore::new();
        let auth = gateway
            .authorize(
                &command_descriptor(),
                &request("bash", json!({"command": "ls"})),
                &mut trust,
                &provider,
            )
            .await;
        assert_eq!(denied_kind(&auth), Some(ErrorKind::PermissionError));
    }

    #[tokio::test]
    async fn trust_target_decision_persists_for_directory() {
        let gateway = gateway();
        let provider = ScriptedProvider::new(vec![Decision::TrustTarget]);
        let mut trust = TrustStore::new();
        let descriptor = path_descriptor("write_file", true);
        let auth = gateway
            .authorize(
                &descriptor,
                &request("write_file", json!({"file_path": "src/a.rs", "content": "x"})),
                &mut trust,
                &provider,
            )
            .await;
        assert_eq!(auth, Authorization::Granted);
        assert_eq!(provider.prompt_count(), 1);
        // A sibling in the same directory no longer prompts.
        let auth = gateway
            .authorize(
                &descriptor,
                &request("write_file", json!({"file_path": "src/b.rs", "content": "x"})),
                &mut trust,
                &provider,
            )
            .await;
        assert_eq!(auth, Authorization::Granted);
        assert_eq!(provider.prompt_count(), 1);
    }

    #[tokio::test]
    async fn trust_global_decision_covers_other_commands() {
        let gateway = gateway();
        let provider = ScriptedProvider::new(vec![Decision::TrustGlobal]);
        let mut trust = TrustStore::new();
        let descriptor = command_descriptor();
        gateway
            .authorize(
                &descriptor,
                &request("bash", json!({"command": "ls"})),
                &mut trust,
                &provider,
            )
            .await;
        let auth = gateway
            .authorize(
                &descriptor,
                &request("bash", json!({"command": "cargo build"})),
                &mut trust,
                &provider,
            )
            .await;
        assert_eq!(auth, Authorization::Granted);
        assert_eq!(provider.prompt_count(), 1);
    }

    #[tokio::test]
    async fn normal_command_prompts_with_normal_tier() {
        let gateway = gateway();
        let provider = ScriptedProvider::new(vec![Decision::AllowOnce]);
        let mut trust = TrustStore::new();
        gateway
            .authorize(
                &command_descriptor(),
                &request("bash", json!({"command": "ls -la"})),
                &mut trust,
                &provider,
            )
            .await;
        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts[0].1, Some(SensitivityTier::Normal));
    }

    #[test]
    fn target_key_uses_resolved_path() {
        let target = PermissionTarget::Path {
            raw: "src/a.rs".to_string(),
            resolved: Path::new("/workspace/project/src/a.rs").to_path_buf(),
        };
        assert_eq!(target.key("write_file"), "/workspace/project/src/a.rs");
        assert_eq!(PermissionTarget::Tool.key("glob"), "glob");
    }
}
