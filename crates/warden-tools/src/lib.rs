//! Tool handlers and the security primitives that gate them: path policy,
//! trust store, registry, and result budgeting.

pub mod budget;
pub mod config;
pub mod executor;
pub mod file;
pub mod registry;
pub mod security;
pub mod shell;
pub mod trust;

use std::sync::Arc;

pub use budget::{ResultBudgetManager, TruncationTier, estimate_tokens};
pub use config::{BudgetConfig, GatewayConfig, ShellConfig};
pub use executor::{ErrorKind, ToolCallRequest, ToolError, ToolHandler, ToolResult};
pub use registry::{RegistryError, TargetShape, ToolDescriptor, ToolRegistry};
pub use security::{PathPolicy, SensitivityTier, classify_sensitivity, command_tier};
pub use trust::{TrustGrant, TrustScope, TrustStore};

use crate::file::{
    EditFileHandler, GlobHandler, GrepHandler, ReadFileHandler, WriteFileHandler,
};
use crate::shell::ShellHandler;

/// Registry preloaded with the built-in shell and filesystem tools.
///
/// # Errors
///
/// Returns `RegistryError` if a built-in descriptor is malformed.
pub fn builtin_registry(
    policy: &PathPolicy,
    config: &GatewayConfig,
) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(
        ShellHandler::descriptor(),
        Arc::new(ShellHandler::new(&config.shell)),
    )?;
    registry.register(
        ReadFileHandler::descriptor(),
        Arc::new(ReadFileHandler::new(policy.clone())),
    )?;
    registry.register(
        WriteFileHandler::descriptor(),
        Arc::new(WriteFileHandler::new(policy.clone())),
    )?;
    registry.register(
        EditFileHandler::descriptor(),
        Arc::new(EditFileHandler::new(policy.clone())),
    )?;
    registry.register(
        GlobHandler::descriptor(),
        Arc::new(GlobHandler::new(policy.clone())),
    )?;
    registry.register(
        GrepHandler::descriptor(),
        Arc::new(GrepHandler::new(policy.clone())),
    )?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn builtin_registry_registers_all_tools() {
        let policy = PathPolicy::new(PathBuf::from("/workspace"), PathBuf::from("/tmp/warden"));
        let registry = builtin_registry(&policy, &GatewayConfig::default()).unwrap();
        let ids: Vec<&str> = registry.descriptors().map(|d| d.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["bash", "read_file", "write_file", "edit_file", "glob", "grep"]
        );
    }
}
