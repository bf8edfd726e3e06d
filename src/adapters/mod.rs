//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the coordinator to external systems:
//! - `storage` - Execution state stores (in-memory, Redis)
//! - `events` - Status publishers (in-memory capture, tracing)
//! - `driver` - Conversation driver for standalone runs
//! - `executor` - Tool executor backed by a handler registry
//! - `sse` - Server-Sent-Events decoding of the model stream

pub mod driver;
pub mod events;
pub mod executor;
pub mod sse;
pub mod storage;

pub use driver::TracingConversationDriver;
pub use events::{InMemoryStatusBus, TracingStatusPublisher};
pub use executor::{RegistryToolExecutor, ToolHandler};
pub use sse::{decode_stream, SseDecoder};
pub use storage::{InMemoryExecutionStore, RedisExecutionStore};
