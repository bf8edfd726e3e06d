//! Application layer - coordination of the streaming tool-call lifecycle.
//!
//! Everything here talks to shared state through [`ExecutionLedger`], which
//! owns the key layout over the `ExecutionStateStore` port.

pub mod completion_watcher;
pub mod coordinator;
pub mod dispatch_coordinator;
pub mod handlers;
pub mod index_allocator;
pub mod ledger;
pub mod resumption_driver;
pub mod worker_pool;

#[cfg(test)]
pub(crate) mod testing;

pub use completion_watcher::{CheckOutcome, CompletionWatcher, WatcherError};
pub use coordinator::ToolCallCoordinator;
pub use dispatch_coordinator::{DispatchCoordinator, DispatchError, DispatchResult};
pub use handlers::{
    StreamToolCallsCommand, StreamToolCallsError, StreamToolCallsHandler, StreamToolCallsResult,
};
pub use index_allocator::{
    Allocation, AllocationError, AllocationPolicy, AllocationStrategy, IndexAllocator,
};
pub use ledger::{ExecutionLedger, LedgerError, Transition};
pub use resumption_driver::{ResumptionDriver, ResumptionError};
pub use worker_pool::{DispatchJob, WorkerPool};
