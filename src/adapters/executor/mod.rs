//! Tool executor adapters.

mod registry;

pub use registry::{RegistryToolExecutor, ToolHandler};
