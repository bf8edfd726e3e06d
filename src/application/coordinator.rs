//! ToolCallCoordinator - wires every component over one store.
//!
//! ```text
//! stream -> StreamToolCallsHandler -> IndexAllocator -> DispatchCoordinator
//!                                                            | channel
//!                                                       WorkerPool -> ToolExecutor
//!                                                            |
//!                      ExecutionLedger <- CompletionWatcher <-+
//!                                              |
//!                                       ResumptionDriver -> ConversationDriver
//! ```

use futures::Stream;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::CoordinatorConfig;
use crate::domain::execution::ExecutionRecord;
use crate::domain::foundation::ExecutionId;
use crate::domain::stream::{RawStreamEvent, StreamFault};
use crate::ports::{ConversationDriver, ExecutionStateStore, StatusPublisher, ToolExecutor};

use super::completion_watcher::{CheckOutcome, CompletionWatcher, WatcherError};
use super::dispatch_coordinator::DispatchCoordinator;
use super::handlers::{
    StreamToolCallsCommand, StreamToolCallsError, StreamToolCallsHandler, StreamToolCallsResult,
};
use super::index_allocator::{AllocationPolicy, IndexAllocator};
use super::ledger::{ExecutionLedger, LedgerError};
use super::resumption_driver::ResumptionDriver;
use super::worker_pool::WorkerPool;

/// Entry point for the conversation driver.
///
/// Must be created inside a tokio runtime: construction starts the worker
/// pool.
pub struct ToolCallCoordinator {
    config: CoordinatorConfig,
    ledger: Arc<ExecutionLedger>,
    watcher: Arc<CompletionWatcher>,
    stream_handler: StreamToolCallsHandler,
}

impl ToolCallCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn ExecutionStateStore>,
        executor: Arc<dyn ToolExecutor>,
        driver: Arc<dyn ConversationDriver>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        let ledger = Arc::new(ExecutionLedger::new(
            store,
            config.execution_ttl(),
            config.completed_retention(),
        ));
        let resumption = ResumptionDriver::new(ledger.clone(), driver, publisher.clone());
        let watcher = Arc::new(CompletionWatcher::new(
            ledger.clone(),
            resumption,
            publisher.clone(),
            config.sweep_interval(),
        ));

        let (jobs, queue) = mpsc::unbounded_channel();
        WorkerPool::new(
            ledger.clone(),
            executor,
            watcher.clone(),
            publisher.clone(),
            config.max_concurrent_tools,
        )
        .spawn(queue);

        let dispatcher = Arc::new(DispatchCoordinator::new(
            ledger.clone(),
            jobs,
            watcher.clone(),
            publisher.clone(),
        ));
        let allocator = IndexAllocator::new(ledger.clone(), AllocationPolicy::from(&config));
        let stream_handler =
            StreamToolCallsHandler::new(ledger.clone(), allocator, dispatcher, watcher.clone(), publisher);

        Self {
            config,
            ledger,
            watcher,
            stream_handler,
        }
    }

    /// Starts a new execution and arms its deadline.
    pub async fn begin_execution(&self) -> Result<ExecutionId, LedgerError> {
        let record = ExecutionRecord::new(
            ExecutionId::new(),
            self.config.execution_timeout(),
            self.config.execution_ttl(),
        );
        self.ledger.begin(&record).await?;
        self.watcher
            .arm_deadline(record.execution_id, self.config.execution_timeout());
        tracing::info!(
            execution_id = %record.execution_id,
            timeout_secs = self.config.execution_timeout_secs,
            "execution started"
        );
        Ok(record.execution_id)
    }

    /// Consumes the model stream of `execution_id`.
    pub async fn process_stream<S>(
        &self,
        execution_id: ExecutionId,
        events: S,
    ) -> Result<StreamToolCallsResult, StreamToolCallsError>
    where
        S: Stream<Item = Result<RawStreamEvent, StreamFault>>,
    {
        self.stream_handler
            .handle(StreamToolCallsCommand::new(execution_id), events)
            .await
    }

    /// Re-checks the completion barrier, e.g. after an external status change.
    pub async fn notify(&self, execution_id: ExecutionId) -> Result<CheckOutcome, WatcherError> {
        self.watcher.check(execution_id).await
    }

    /// Runs the periodic sweep until `shutdown` flips to true.
    pub fn spawn_sweeper(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.watcher.clone().run(shutdown))
    }

    pub fn ledger(&self) -> &Arc<ExecutionLedger> {
        &self.ledger
    }

    pub fn watcher(&self) -> &Arc<CompletionWatcher> {
        &self.watcher
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}

impl std::fmt::Debug for ToolCallCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
