//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the coordinator and the outside world. Adapters implement these ports.
//!
//! ## Coordination
//!
//! - `ExecutionStateStore` - Shared, atomic-per-key execution state
//!
//! ## Collaborators
//!
//! - `ToolExecutor` - Runs one tool call
//! - `ConversationDriver` - Receives the resumption outcome
//! - `StatusPublisher` - Best-effort observer events

mod conversation_driver;
mod execution_state_store;
mod status_publisher;
mod tool_executor;

pub use conversation_driver::ConversationDriver;
pub use execution_state_store::{ExecutionStateStore, StateStoreError};
pub use status_publisher::{StatusEvent, StatusPublisher};
pub use tool_executor::{ToolExecutionError, ToolExecutor, ToolRequest};
