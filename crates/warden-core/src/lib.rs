//! Permission gateway and tool orchestrator.
//!
//! `warden-core` sits between an LLM conversation layer and the tool
//! handlers in `warden-tools`: every call is screened for traversal and
//! boundary violations, checked against the session trust store, confirmed
//! with the user when needed, executed, and finally charged against the
//! context budget.

pub mod error;
pub mod gateway;
pub mod orchestrator;

pub use error::BatchError;
pub use gateway::{
    Authorization, ConfirmationProvider, ConfirmationRequest, Decision, PermissionGateway,
    PermissionTarget,
};
pub use orchestrator::ToolOrchestrator;
