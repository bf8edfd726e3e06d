//! Tool Executor Port - Interface for running one recognized tool call.
//!
//! The coordinator hands every completed invocation to an executor as soon as
//! its arguments finish streaming. Executors run concurrently; the coordinator
//! never waits on one from the parsing path.
//!
//! # Outcome mapping
//!
//! - `Ok(value)` - the invocation succeeded with `value` as its result
//! - `Err(_)` - the invocation failed
//! - no answer before the execution deadline - the invocation timed out
//!
//! # Example
//!
//! ```ignore
//! use async_trait::async_trait;
//! use tool_relay::ports::{ToolExecutor, ToolRequest, ToolExecutionError};
//!
//! struct HttpToolExecutor { /* ... */ }
//!
//! #[async_trait]
//! impl ToolExecutor for HttpToolExecutor {
//!     async fn execute(&self, request: ToolRequest) -> Result<serde_json::Value, ToolExecutionError> {
//!         // 1. Inspect request.arguments (structured or raw)
//!         // 2. Run the tool
//!         // 3. Return its JSON result
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ExecutionId, InvocationId, ValidationError};
use crate::domain::invocation::{Invocation, ToolArguments};

/// Port for executing tool calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute one tool call and return its JSON result.
    async fn execute(&self, request: ToolRequest) -> Result<Value, ToolExecutionError>;
}

/// Everything an executor needs to run one invocation.
///
/// Arguments may be `Raw` when the streamed JSON could not be parsed; the
/// executor decides whether it can still act on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub execution_id: ExecutionId,
    pub invocation_id: InvocationId,
    pub index: u64,
    pub tool_name: String,
    pub arguments: ToolArguments,
}

impl ToolRequest {
    /// Builds the request for a recorded invocation.
    pub fn for_invocation(invocation: &Invocation) -> Self {
        Self {
            execution_id: invocation.execution_id(),
            invocation_id: invocation.invocation_id().clone(),
            index: invocation.index(),
            tool_name: invocation.tool_name().to_string(),
            arguments: invocation.arguments().clone(),
        }
    }
}

/// Errors that can occur during tool execution.
#[derive(Debug, Clone, Error)]
pub enum ToolExecutionError {
    /// Tool not found
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Arguments could not be used
    #[error("Validation error: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Domain error during execution
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),

    /// Infrastructure/system error
    #[error("System error: {0}")]
    SystemError(String),
}

impl ToolExecutionError {
    /// Creates a system error.
    pub fn system(message: impl Into<String>) -> Self {
        Self::SystemError(message.into())
    }
}
