use std::time::Duration;

use thiserror::Error;

/// Failures of the tool-calling path.
///
/// Everything except `MalformedSchema` is a call-time condition that ends up
/// in the transcript as a failed tool turn so the model can correct itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    /// The call names an operation that is not registered.
    #[error("Unknown tool '{0}'")]
    UnknownOperation(String),

    /// A schema violated its own invariants at registration time.
    #[error("Malformed schema for '{operation}': {reason}")]
    MalformedSchema { operation: String, reason: String },

    #[error("Missing required parameter '{parameter}' for tool '{operation}'")]
    MissingRequiredParameter { operation: String, parameter: String },

    #[error("Parameter '{parameter}' must be {expected}, got {received}")]
    TypeMismatch {
        parameter: String,
        expected: String,
        received: String,
    },

    #[error("Parameter '{parameter}' must be one of [{}], got '{value}'", .allowed.join(", "))]
    InvalidEnumValue {
        parameter: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Unknown parameter '{parameter}' for tool '{operation}'")]
    UnknownParameter { operation: String, parameter: String },

    /// The operation itself ran and failed.
    #[error("Error executing {operation}: {message}")]
    OperationFailure { operation: String, message: String },

    #[error("Tool '{operation}' timed out after {limit:?}")]
    Timeout { operation: String, limit: Duration },

    /// Safety valve on consecutive tool turns within one user turn.
    #[error("Stopped after {0} consecutive tool calls without a final answer")]
    ToolLoopCapExceeded(usize),
}

impl ToolError {
    pub fn malformed(operation: &str, reason: impl Into<String>) -> Self {
        Self::MalformedSchema {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}
