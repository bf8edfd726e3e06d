//! Storage Adapters
//!
//! Implementations of the ExecutionStateStore port.
//!
//! ## Available Adapters
//!
//! - **InMemoryExecutionStore** - Process-local map (testing/single node)
//! - **RedisExecutionStore** - Shared Redis (multi-process deployments)
//!
//! ## Usage
//!
//! ```ignore
//! use tool_relay::adapters::storage::{InMemoryExecutionStore, RedisExecutionStore};
//!
//! // Production: shared store
//! let store = RedisExecutionStore::connect(&config.store.redis).await?;
//!
//! // Testing: in-memory store
//! let store = InMemoryExecutionStore::new();
//! ```

mod in_memory_execution_store;
mod redis_execution_store;

pub use in_memory_execution_store::InMemoryExecutionStore;
pub use redis_execution_store::RedisExecutionStore;
