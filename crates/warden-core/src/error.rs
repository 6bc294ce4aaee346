//! Batch-level rejections.
//!
//! A `BatchError` means the whole batch was refused before any call ran;
//! failures of individual calls are reported inside their `ToolResult`
//! instead and never abort the batch.

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("batch contains no tool calls")]
    Empty,

    #[error("batch of {len} calls exceeds the maximum of {max}")]
    TooLarge { len: usize, max: usize },

    #[error("malformed tool call at index {index}: {reason}")]
    Malformed { index: usize, reason: String },
}
