//! Conversation driver adapters.

mod tracing_driver;

pub use tracing_driver::TracingConversationDriver;
