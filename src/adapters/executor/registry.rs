//! Registry Tool Executor - routes tool calls to named handlers.
//!
//! # Example
//!
//! ```ignore
//! use tool_relay::adapters::executor::RegistryToolExecutor;
//!
//! let mut registry = RegistryToolExecutor::new();
//! registry.register_fn("echo", |args| Ok(serde_json::to_value(args).unwrap_or_default()));
//! registry.register("search", Arc::new(SearchHandler::new(client)));
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::invocation::ToolArguments;
use crate::ports::{ToolExecutionError, ToolExecutor, ToolRequest};

/// One named tool.
///
/// Handlers receive arguments exactly as reconstructed from the stream,
/// including `Raw` text when the JSON was malformed.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: &ToolArguments) -> Result<Value, ToolExecutionError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(&ToolArguments) -> Result<Value, ToolExecutionError> + Send + Sync,
{
    async fn call(&self, arguments: &ToolArguments) -> Result<Value, ToolExecutionError> {
        (self.0)(arguments)
    }
}

/// Executor backed by a name -> handler map.
#[derive(Clone, Default)]
pub struct RegistryToolExecutor {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl RegistryToolExecutor {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an async handler, replacing any previous one with that name.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Registers a synchronous closure.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&ToolArguments) -> Result<Value, ToolExecutionError> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnHandler(f)))
    }

    /// Check if a tool exists.
    pub fn has_tool(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl ToolExecutor for RegistryToolExecutor {
    async fn execute(&self, request: ToolRequest) -> Result<Value, ToolExecutionError> {
        let handler = self
            .handlers
            .get(&request.tool_name)
            .cloned()
            .ok_or_else(|| ToolExecutionError::ToolNotFound(request.tool_name.clone()))?;

        tracing::debug!(
            execution_id = %request.execution_id,
            index = request.index,
            tool_name = %request.tool_name,
            degraded = request.arguments.is_degraded(),
            "running tool handler"
        );

        handler.call(&request.arguments).await
    }
}

impl std::fmt::Debug for RegistryToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryToolExecutor")
            .field("tools", &self.tool_names())
            .finish()
    }
}
