//! Execution State Store Port - shared key/value state for executions.
//!
//! The store is the only coordination channel between the parsing path, the
//! worker pool and the completion watcher. Every operation is atomic per key;
//! there is no multi-key transaction and no global lock.
//!
//! Keys are plain strings. Values are strings (JSON-encoded where structured)
//! or sets of strings. Every write carries a TTL so abandoned executions are
//! reclaimed by the backend.

use async_trait::async_trait;
use std::time::Duration;

/// Errors that can occur during state store operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StateStoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Key '{key}' holds the wrong kind of value")]
    WrongType { key: String },

    #[error("Store command failed: {0}")]
    CommandFailed(String),
}

/// Port for execution-scoped shared state
#[async_trait]
pub trait ExecutionStateStore: Send + Sync {
    /// Atomically increment a counter, initializing it when absent.
    ///
    /// An absent key is set to `initial` and `initial` is returned. A present
    /// key is incremented by one and the new value returned. The TTL is
    /// refreshed either way.
    ///
    /// # Returns
    /// `Ok(None)` when the backend accepted the command but produced no
    /// value; callers treat this as retryable.
    async fn increment(
        &self,
        key: &str,
        initial: i64,
        ttl: Duration,
    ) -> Result<Option<i64>, StateStoreError>;

    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>, StateStoreError>;

    /// Unconditionally write a string value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StateStoreError>;

    /// Write only if the key is absent.
    ///
    /// # Returns
    /// `true` if this call created the key
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError>;

    /// Replace the value only if it currently equals `expected`.
    ///
    /// `expected = None` means "only if absent".
    ///
    /// # Returns
    /// `true` if the swap happened
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError>;

    /// Add a member to a set.
    ///
    /// # Returns
    /// `true` if the member was not already present
    async fn add_member(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError>;

    /// Remove a member from a set.
    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StateStoreError>;

    /// All members of a set; empty when the key is absent.
    async fn members(&self, key: &str) -> Result<Vec<String>, StateStoreError>;

    /// Reset a key's lifetime. Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StateStoreError>;

    /// Remove a key. Returns `false` when the key did not exist.
    async fn delete(&self, key: &str) -> Result<bool, StateStoreError>;
}
