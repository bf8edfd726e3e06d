//! Shared fixtures for application-layer tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::adapters::events::InMemoryStatusBus;
use crate::adapters::storage::InMemoryExecutionStore;
use crate::domain::execution::ExecutionRecord;
use crate::domain::foundation::{DomainError, ExecutionId};
use crate::domain::resumption::ResumptionOutcome;
use crate::ports::{
    ConversationDriver, ExecutionStateStore, StateStoreError, ToolExecutionError, ToolExecutor,
    ToolRequest,
};
use tokio::sync::Notify;

use super::completion_watcher::CompletionWatcher;
use super::ledger::ExecutionLedger;
use super::resumption_driver::ResumptionDriver;

/// Conversation driver that keeps every outcome it receives.
#[derive(Default)]
pub(crate) struct CollectingDriver {
    outcomes: Mutex<Vec<ResumptionOutcome>>,
}

impl CollectingDriver {
    pub(crate) fn calls(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }

    pub(crate) fn outcomes(&self) -> Vec<ResumptionOutcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationDriver for CollectingDriver {
    async fn on_resumption(&self, outcome: ResumptionOutcome) -> Result<(), DomainError> {
        self.outcomes.lock().unwrap().push(outcome);
        Ok(())
    }
}

/// Executor whose behaviour is chosen by tool name:
/// `fail` errors, `panic` panics, `hang` never answers, anything else echoes
/// its arguments after `delay`.
#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    pub(crate) delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    async fn execute(&self, request: ToolRequest) -> Result<Value, ToolExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match request.tool_name.as_str() {
            "fail" => Err(ToolExecutionError::SystemError("backend down".to_string())),
            "panic" => panic!("tool crashed"),
            "hang" => std::future::pending().await,
            name => {
                let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                self.running.fetch_sub(1, Ordering::SeqCst);
                Ok(json!({ "tool": name, "arguments": request.arguments }))
            }
        }
    }
}

/// Ledger, bus, driver and watcher over one in-memory store.
pub(crate) struct Harness {
    pub(crate) ledger: Arc<ExecutionLedger>,
    pub(crate) bus: Arc<InMemoryStatusBus>,
    pub(crate) driver: Arc<CollectingDriver>,
    pub(crate) watcher: Arc<CompletionWatcher>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_store(Arc::new(InMemoryExecutionStore::new()))
    }

    pub(crate) fn with_store(store: Arc<dyn ExecutionStateStore>) -> Self {
        let ledger = Arc::new(ExecutionLedger::new(
            store,
            Duration::from_secs(600),
            Duration::from_secs(30),
        ));
        let bus = Arc::new(InMemoryStatusBus::new());
        let driver = Arc::new(CollectingDriver::default());
        let resumption = ResumptionDriver::new(ledger.clone(), driver.clone(), bus.clone());
        let watcher = Arc::new(CompletionWatcher::new(
            ledger.clone(),
            resumption,
            bus.clone(),
            Duration::from_millis(50),
        ));
        Self {
            ledger,
            bus,
            driver,
            watcher,
        }
    }

    pub(crate) async fn begin(&self, timeout: Duration) -> ExecutionId {
        let record = ExecutionRecord::new(ExecutionId::new(), timeout, self.ledger.ttl());
        self.ledger.begin(&record).await.unwrap();
        record.execution_id
    }
}

/// In-memory store with injectable faults.
///
/// - `hold_next_increment` parks the next `increment` until released.
/// - `fail_members` makes set reads on matching keys fail a number of times.
#[derive(Default)]
pub(crate) struct FaultyStore {
    inner: InMemoryExecutionStore,
    held: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
    failing_members: Mutex<Option<(String, usize)>>,
}

impl FaultyStore {
    /// Returns `(reached, release)`: `reached` fires once the increment is
    /// parked, `release` lets it continue.
    pub(crate) fn hold_next_increment(&self) -> (Arc<Notify>, Arc<Notify>) {
        let gate = (Arc::new(Notify::new()), Arc::new(Notify::new()));
        *self.held.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn fail_members(&self, key_suffix: &str, times: usize) {
        *self.failing_members.lock().unwrap() = Some((key_suffix.to_string(), times));
    }
}

#[async_trait]
impl ExecutionStateStore for FaultyStore {
    async fn increment(
        &self,
        key: &str,
        initial: i64,
        ttl: Duration,
    ) -> Result<Option<i64>, StateStoreError> {
        let held = self.held.lock().unwrap().take();
        if let Some((reached, release)) = held {
            reached.notify_one();
            release.notified().await;
        }
        self.inner.increment(key, initial, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StateStoreError> {
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StateStoreError> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError> {
        self.inner.compare_and_set(key, expected, new, ttl).await
    }

    async fn add_member(&self, key: &str, member: &str, ttl: Duration) -> Result<bool, StateStoreError> {
        self.inner.add_member(key, member, ttl).await
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StateStoreError> {
        self.inner.remove_member(key, member).await
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StateStoreError> {
        {
            let mut failing = self.failing_members.lock().unwrap();
            if let Some((suffix, remaining)) = failing.as_mut() {
                if *remaining > 0 && key.ends_with(suffix.as_str()) {
                    *remaining -= 1;
                    return Err(StateStoreError::Unavailable("connection reset".to_string()));
                }
            }
        }
        self.inner.members(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StateStoreError> {
        self.inner.expire(key, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StateStoreError> {
        self.inner.delete(key).await
    }
}
