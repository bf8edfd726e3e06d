//! Invocation module - recognized tool calls and their dispatch lifecycle.

mod arguments;
mod dispatch_status;
#[allow(clippy::module_inception)]
mod invocation;

pub use arguments::ToolArguments;
pub use dispatch_status::DispatchStatus;
pub use invocation::Invocation;
