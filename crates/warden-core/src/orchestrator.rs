//! Dispatches tool calls through the permission gateway and charges their
//! results against the context budget.
//!
//! Batches run in two phases: authorization walks the requests sequentially
//! in order (confirmation prompts cannot overlap), then every authorized call
//! runs concurrently. Results always come back in request order, and a
//! failing call never disturbs its neighbors.

use std::sync::Arc;

use tracing::{debug, warn};

use warden_tools::budget::ResultBudgetManager;
use warden_tools::config::GatewayConfig;
use warden_tools::executor::{
    ErrorKind, ToolCallRequest, ToolError, ToolHandler, ToolResult,
};
use warden_tools::registry::{ToolDescriptor, ToolRegistry};
use warden_tools::security::PathPolicy;
use warden_tools::trust::TrustStore;

use crate::error::BatchError;
use crate::gateway::{Authorization, ConfirmationProvider, PermissionGateway};

/// An authorized call, ready to run.
struct ReadyCall {
    handler: Arc<dyn ToolHandler>,
    arguments: serde_json::Map<String, serde_json::Value>,
    tool_id: String,
    truncatable: bool,
    guidance: Option<String>,
}

enum Prepared {
    Denied(ToolResult),
    Ready(ReadyCall),
}

pub struct ToolOrchestrator {
    registry: ToolRegistry,
    gateway: PermissionGateway,
    trust: TrustStore,
    budget: ResultBudgetManager,
    confirm: Arc<dyn ConfirmationProvider>,
    max_batch_size: usize,
}

impl ToolOrchestrator {
    #[must_use]
    pub fn new(
        registry: ToolRegistry,
        policy: PathPolicy,
        config: &GatewayConfig,
        confirm: Arc<dyn ConfirmationProvider>,
    ) -> Self {
        Self {
            registry,
            gateway: PermissionGateway::new(policy),
            trust: TrustStore::new(),
            budget: ResultBudgetManager::new(config.budget.clone()),
            confirm,
            max_batch_size: config.max_batch_size,
        }
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.registry.descriptors()
    }

    pub fn trust_mut(&mut self) -> &mut TrustStore {
        &mut self.trust
    }

    #[must_use]
    pub fn estimate_remaining_calls(&self, tool_id: &str) -> usize {
        self.budget.estimate_remaining_calls(tool_id)
    }

    /// Run one tool call end to end: authorize, execute, budget.
    pub async fn execute(&mut self, request: &ToolCallRequest) -> ToolResult {
        match self.prepare(request).await {
            Prepared::Denied(result) => {
                self.charge(&request.name, result, true, None)
            }
            Prepared::Ready(call) => {
                let outcome = call.handler.run(call.arguments).await;
                let result = result_from_outcome(outcome);
                self.charge(
                    &call.tool_id,
                    result,
                    call.truncatable,
                    call.guidance.as_deref(),
                )
            }
        }
    }

    /// Run a batch of tool calls. The whole batch is validated and rejected
    /// up front for structural problems; anything past that point comes back
    /// as one `ToolResult` per request, in request order.
    pub async fn execute_many(
        &mut self,
        requests: &[ToolCallRequest],
    ) -> Result<Vec<ToolResult>, BatchError> {
        if requests.is_empty() {
            return Err(BatchError::Empty);
        }
        if requests.len() > self.max_batch_size {
            return Err(BatchError::TooLarge {
                len: requests.len(),
                max: self.max_batch_size,
            });
        }
        for (index, request) in requests.iter().enumerate() {
            if request.name.trim().is_empty() {
                return Err(BatchError::Malformed {
                    index,
                    reason: "missing tool name".to_string(),
                });
            }
        }
        debug!(calls = requests.len(), "dispatching tool batch");

        // Phase 1: authorization, strictly in request order.
        let mut slots = Vec::with_capacity(requests.len());
        let mut handles = Vec::new();
        for request in requests {
            match self.prepare(request).await {
                Prepared::Denied(result) => slots.push(Slot::Done(result)),
                Prepared::Ready(call) => {
                    let handler = call.handler;
                    let arguments = call.arguments;
                    handles.push(tokio::spawn(
                        async move { handler.run(arguments).await },
                    ));
                    slots.push(Slot::Spawned {
                        tool_id: call.tool_id,
                        truncatable: call.truncatable,
                        guidance: call.guidance,
                    });
                }
            }
        }

        // Phase 2: authorized calls run concurrently; join order matches
        // spawn order, which matches request order.
        let mut outcomes = futures::future::join_all(handles).await.into_iter();
        let mut results = Vec::with_capacity(slots.len());
        for (request, slot) in requests.iter().zip(slots) {
            let result = match slot {
                Slot::Done(result) => self.charge(&request.name, result, true, None),
                Slot::Spawned {
                    tool_id,
                    truncatable,
                    guidance,
                } => {
                    let result = match outcomes.next() {
                        Some(Ok(outcome)) => result_from_outcome(outcome),
                        Some(Err(join_err)) => {
                            warn!(tool = %tool_id, error = %join_err, "tool task panicked");
                            ToolResult::failure(
                                ErrorKind::SystemError,
                                format!("tool task failed: {join_err}"),
                            )
                        }
                        None => ToolResult::failure(
                            ErrorKind::SystemError,
                            "tool task result missing".to_string(),
                        ),
                    };
                    self.charge(&tool_id, result, truncatable, guidance.as_deref())
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn prepare(&mut self, request: &ToolCallRequest) -> Prepared {
        let Some(tool) = self.registry.get(&request.name) else {
            return Prepared::Denied(named(
                ToolResult::failure(
                    ErrorKind::ValidationError,
                    format!("unknown tool '{}'", request.name),
                ),
                &request.name,
            ));
        };
        match self
            .gateway
            .authorize(&tool.descriptor, request, &mut self.trust, self.confirm.as_ref())
            .await
        {
            Authorization::Granted => Prepared::Ready(ReadyCall {
                handler: Arc::clone(&tool.handler),
                arguments: request.arguments.clone(),
                tool_id: tool.descriptor.id.clone(),
                truncatable: tool.descriptor.truncatable,
                guidance: tool.descriptor.truncation_guidance.clone(),
            }),
            Authorization::Denied { reason, kind } => {
                Prepared::Denied(named(ToolResult::failure(kind, reason), &request.name))
            }
        }
    }

    fn charge(
        &mut self,
        tool_id: &str,
        result: ToolResult,
        truncatable: bool,
        guidance: Option<&str>,
    ) -> ToolResult {
        named(
            self.budget.process(tool_id, result, truncatable, guidance),
            tool_id,
        )
    }
}

enum Slot {
    Done(ToolResult),
    Spawned {
        tool_id: String,
        truncatable: bool,
        guidance: Option<String>,
    },
}

fn result_from_outcome(outcome: Result<ToolResult, ToolError>) -> ToolResult {
    match outcome {
        Ok(result) => result,
        Err(err) => ToolResult::failure(err.kind(), err.to_string()),
    }
}

fn named(mut result: ToolResult, tool_name: &str) -> ToolResult {
    if result.tool_name.is_empty() {
        result.tool_name = tool_name.to_string();
    }
    result
}
