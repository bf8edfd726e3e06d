//! In-Memory Execution Store Adapter
//!
//! Keeps execution state in a process-local map split into shards, each
//! behind its own tokio mutex. A key always maps to the same shard, so every
//! operation is atomic per key without a store-wide lock. Useful for tests
//! and single-node deployments. Expiry is lazy: an expired entry is treated
//! as absent on access and removed by `purge_expired`.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::ports::{ExecutionStateStore, StateStoreError};

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Instant,
}

impl Entry {
    fn new(value: StoredValue, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

const SHARDS: usize = 16;

type Shard = Mutex<HashMap<String, Entry>>;

/// In-memory execution store
#[derive(Debug, Clone)]
pub struct InMemoryExecutionStore {
    shards: Arc<Vec<Shard>>,
}

impl Default for InMemoryExecutionStore {
    fn default() -> Self {
        Self {
            shards: Arc::new((0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect()),
        }
    }
}

impl InMemoryExecutionStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Remove every expired entry, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut dropped = 0;
        for shard in self.shards.iter() {
            let mut entries = shard.lock().await;
            let before = entries.len();
            entries.retain(|_, entry| entry.is_live(now));
            dropped += before - entries.len();
        }
        dropped
    }

    /// Number of live keys (useful for tests)
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let mut live = 0;
        for shard in self.shards.iter() {
            live += shard.lock().await.values().filter(|e| e.is_live(now)).count();
        }
        live
    }

    /// True when no live keys remain
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining lifetime of a key, if it is live (useful for tests)
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.shard(key).lock().await;
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    /// Clear all stored data (useful for tests)
    pub async fn clear(&self) {
        for shard in self.shards.iter() {
            shard.lock().await.clear();
        }
    }
}

/// Looks up a live entry, dropping it first if it has expired.
fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|e| !e.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn wrong_type(key: &str) -> StateStoreError {
    StateStoreError::WrongType {
        key: key.to_string(),
    }
}

#[async_trait]
impl ExecutionStateStore for InMemoryExecutionStore {
    async fn increment(
        &self,
        key: &str,
        initial: i64,
        ttl: Duration,
    ) -> Result<Option<i64>, StateStoreError> {
        let mut entries = self.shard(key).lock().await;
        let next = match live(&mut entries, key) {
            Some(Entry {
                value: StoredValue::Text(current),
                ..
            }) => {
                let current: i64 = current
                    .parse()
                    .map_err(|_| StateStoreError::CommandFailed(format!("'{}' is not an integer", key)))?;
                current + 1
            }
            Some(_) => return Err(wrong_type(key)),
            None => initial,
        };
        entries.insert(key.to_string(), Entry::new(StoredValue::Text(next.to_string()), ttl));
        Ok(Some(next))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        let mut entries = self.shard(key).lock().await;
        match live(&mut entries, key) {
            Some(Entry {
                value: StoredValue::Text(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StateStoreError> {
        let mut entries = self.shard(key).lock().await;
        entries.insert(key.to_string(), Entry::new(StoredValue::Text(value.to_string()), ttl));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError> {
        let mut entries = self.shard(key).lock().await;
        if live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::new(StoredValue::Text(value.to_string()), ttl));
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError> {
        let mut entries = self.shard(key).lock().await;
        let matches = match (live(&mut entries, key), expected) {
            (None, None) => true,
            (
                Some(Entry {
                    value: StoredValue::Text(current),
                    ..
                }),
                Some(expected),
            ) => current == expected,
            (Some(Entry {
                value: StoredValue::Set(_),
                ..
            }), _) => return Err(wrong_type(key)),
            _ => false,
        };
        if matches {
            entries.insert(key.to_string(), Entry::new(StoredValue::Text(new.to_string()), ttl));
        }
        Ok(matches)
    }

    async fn add_member(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError> {
        let mut entries = self.shard(key).lock().await;
        let expires_at = Instant::now() + ttl;
        match live(&mut entries, key) {
            Some(entry) => {
                let StoredValue::Set(set) = &mut entry.value else {
                    return Err(wrong_type(key));
                };
                let added = set.insert(member.to_string());
                entry.expires_at = expires_at;
                Ok(added)
            }
            None => {
                let set = HashSet::from([member.to_string()]);
                entries.insert(key.to_string(), Entry::new(StoredValue::Set(set), ttl));
                Ok(true)
            }
        }
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StateStoreError> {
        let mut entries = self.shard(key).lock().await;
        match live(&mut entries, key) {
            Some(Entry {
                value: StoredValue::Set(set),
                ..
            }) => Ok(set.remove(member)),
            Some(_) => Err(wrong_type(key)),
            None => Ok(false),
        }
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StateStoreError> {
        let mut entries = self.shard(key).lock().await;
        match live(&mut entries, key) {
            Some(Entry {
                value: StoredValue::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StateStoreError> {
        let mut entries = self.shard(key).lock().await;
        match live(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StateStoreError> {
        let mut entries = self.shard(key).lock().await;
        let existed = live(&mut entries, key).is_some();
        entries.remove(key);
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn increment_initializes_then_counts() {
        let store = InMemoryExecutionStore::new();
        assert_eq!(store.increment("c", 0, TTL).await.unwrap(), Some(0));
        assert_eq!(store.increment("c", 0, TTL).await.unwrap(), Some(1));
        assert_eq!(store.increment("c", 0, TTL).await.unwrap(), Some(2));
        assert_eq!(store.get("c").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn concurrent_increments_never_repeat() {
        let store = InMemoryExecutionStore::new();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment("c", 0, TTL).await.unwrap().unwrap()
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()));
        }
        assert_eq!(seen.len(), 32);
    }

    #[tokio::test]
    async fn set_if_absent_only_first_wins() {
        let store = InMemoryExecutionStore::new();
        assert!(store.set_if_absent("k", "a", TTL).await.unwrap());
        assert!(!store.set_if_absent("k", "b", TTL).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn compare_and_set_requires_expected_value() {
        let store = InMemoryExecutionStore::new();
        assert!(store.compare_and_set("k", None, "v1", TTL).await.unwrap());
        assert!(!store.compare_and_set("k", None, "v2", TTL).await.unwrap());
        assert!(!store.compare_and_set("k", Some("v0"), "v2", TTL).await.unwrap());
        assert!(store.compare_and_set("k", Some("v1"), "v2", TTL).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn sets_report_new_members() {
        let store = InMemoryExecutionStore::new();
        assert!(store.add_member("s", "1", TTL).await.unwrap());
        assert!(!store.add_member("s", "1", TTL).await.unwrap());
        assert!(store.add_member("s", "2", TTL).await.unwrap());

        let mut members = store.members("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["1", "2"]);

        assert!(store.remove_member("s", "1").await.unwrap());
        assert_eq!(store.members("s").await.unwrap(), vec!["2"]);
        assert!(store.members("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn type_mismatch_is_an_error() {
        let store = InMemoryExecutionStore::new();
        store.add_member("s", "1", TTL).await.unwrap();
        assert!(matches!(
            store.get("s").await,
            Err(StateStoreError::WrongType { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_lazily() {
        let store = InMemoryExecutionStore::new();
        store.set("k", "v", Duration::from_secs(5)).await.unwrap();
        store.add_member("s", "m", Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_if_absent("k", "again", TTL).await.unwrap());
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_extends_lifetime() {
        let store = InMemoryExecutionStore::new();
        store.set("k", "v", Duration::from_secs(5)).await.unwrap();
        assert!(store.expire("k", Duration::from_secs(30)).await.unwrap());

        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.ttl("k").await.unwrap() <= Duration::from_secs(20));
        assert!(!store.expire("missing", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = InMemoryExecutionStore::new();
        store.set("k", "v", TTL).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn a_held_shard_does_not_block_other_keys() {
        let store = InMemoryExecutionStore::new();
        let held = store.shard("exec:a:status").lock().await;
        let other = (0..)
            .map(|i| format!("exec:b{}:status", i))
            .find(|k| !std::ptr::eq(store.shard(k), store.shard("exec:a:status")))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), store.set(&other, "v", TTL))
            .await
            .expect("write to another shard waited on the held lock")
            .unwrap();
        drop(held);
        assert_eq!(store.get(&other).await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn counts_span_every_shard() {
        let store = InMemoryExecutionStore::new();
        for i in 0..40 {
            store.set(&format!("k{}", i), "v", TTL).await.unwrap();
        }
        assert_eq!(store.len().await, 40);
        store.clear().await;
        assert!(store.is_empty().await);
    }
}
