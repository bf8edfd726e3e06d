//! Status event adapters.
//!
//! - `InMemoryStatusBus` - Captures events for test assertions
//! - `TracingStatusPublisher` - Writes events to the structured log

mod in_memory_status_bus;
mod tracing_publisher;

pub use in_memory_status_bus::InMemoryStatusBus;
pub use tracing_publisher::TracingStatusPublisher;
