//! Execution module - one conversational turn's tool-call lifecycle.

mod record;
mod status;

pub use record::ExecutionRecord;
pub use status::ExecutionStatus;
