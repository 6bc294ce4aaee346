//! Tool registration and lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::executor::ToolHandler;

/// Which argument of a tool call names its permission target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetShape {
    /// The named JSON argument holds a filesystem path or glob.
    Path(&'static str),
    /// The named JSON argument holds a shell command line.
    Command(&'static str),
    /// The tool has no external target; permission covers the tool itself.
    None,
}

/// Static metadata for one tool. The schema is the JSON Schema advertised to
/// the model for the tool's arguments.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub id: String,
    pub description: String,
    pub schema: serde_json::Value,
    pub target_shape: TargetShape,
    /// Read-only tools skip the interactive prompt; security checks still run.
    pub requires_confirmation: bool,
    /// When false the result is never shortened, whatever the budget says.
    pub truncatable: bool,
    /// Appended to truncation banners to tell the model how to narrow the call.
    pub truncation_guidance: Option<String>,
}

pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool id must not be empty")]
    EmptyId,
    #[error("tool '{id}' is already registered")]
    DuplicateTool { id: String },
    #[error("tool '{id}' has a non-object parameter schema")]
    InvalidSchema { id: String },
}

/// Registered tools, looked up by id. Listing preserves registration order
/// so the advertised tool list is stable across runs.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<RegisteredTool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        if descriptor.id.is_empty() {
            return Err(RegistryError::EmptyId);
        }
        if self.tools.contains_key(&descriptor.id) {
            return Err(RegistryError::DuplicateTool {
                id: descriptor.id,
            });
        }
        if !descriptor.schema.is_object() {
            return Err(RegistryError::InvalidSchema {
                id: descriptor.id,
            });
        }
        let id = descriptor.id.clone();
        self.tools
            .insert(id.clone(), Arc::new(RegisteredTool { descriptor, handler }));
        self.order.push(id);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<RegisteredTool>> {
        self.tools.get(id).cloned()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|id| self.tools.get(id))
            .map(|tool| &tool.descriptor)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
