//! In-process signal store

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{SignalStore, SignalStoreError};
use crate::clock::{Clock, SystemClock};

/// Longest TTL honoured; larger values are capped
const MAX_TTL_SECONDS: i64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
enum Value {
    Counter(i64),
    Text(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Signal store backed by a single locked map.
///
/// Every operation takes the write lock for its whole read-modify-write, which
/// makes each call linearizable. Expired keys are dropped lazily on access and
/// in bulk by [`MemorySignalStore::purge_expired`].
#[derive(Clone)]
pub struct MemorySignalStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Drop every expired key. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn expiry(now: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
        let secs = i64::try_from(ttl_seconds)
            .unwrap_or(MAX_TTL_SECONDS)
            .min(MAX_TTL_SECONDS);
        now + Duration::seconds(secs)
    }
}

impl Default for MemorySignalStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove `key` if it has expired, so the caller sees it as absent.
fn evict_if_expired(entries: &mut HashMap<String, Entry>, key: &str, now: DateTime<Utc>) {
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn increment_with_expiry(
        &self,
        key: &str,
        ttl_seconds: u64,
    ) -> Result<i64, SignalStoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        evict_if_expired(&mut entries, key, now);

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Counter(0),
            expires_at: None,
        });

        let count = match &mut entry.value {
            Value::Counter(n) => {
                *n += 1;
                *n
            }
            _ => return Err(SignalStoreError::WrongType(key.to_string())),
        };
        entry.expires_at = Some(Self::expiry(now, ttl_seconds));

        Ok(count)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, SignalStoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        evict_if_expired(&mut entries, key, now);

        if entries.contains_key(key) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(Self::expiry(now, ttl_seconds)),
            },
        );
        Ok(true)
    }

    async fn is_member(&self, set_key: &str, member: &str) -> Result<bool, SignalStoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;

        match entries.get(set_key) {
            None => Ok(false),
            Some(entry) if entry.is_expired(now) => Ok(false),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.contains(member)),
            Some(_) => Err(SignalStoreError::WrongType(set_key.to_string())),
        }
    }

    async fn add_member(
        &self,
        set_key: &str,
        member: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, SignalStoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        evict_if_expired(&mut entries, set_key, now);

        let entry = entries.entry(set_key.to_string()).or_insert(Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });

        let added = match &mut entry.value {
            Value::Set(members) => members.insert(member.to_string()),
            _ => return Err(SignalStoreError::WrongType(set_key.to_string())),
        };
        if let Some(ttl) = ttl_seconds {
            entry.expires_at = Some(Self::expiry(now, ttl));
        }

        Ok(added)
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> Result<bool, SignalStoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        evict_if_expired(&mut entries, set_key, now);

        let Some(entry) = entries.get_mut(set_key) else {
            return Ok(false);
        };
        let removed = match &mut entry.value {
            Value::Set(members) => members.remove(member),
            _ => return Err(SignalStoreError::WrongType(set_key.to_string())),
        };

        if matches!(&entry.value, Value::Set(members) if members.is_empty()) {
            entries.remove(set_key);
        }
        Ok(removed)
    }

    async fn cardinality(&self, set_key: &str) -> Result<usize, SignalStoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;

        match entries.get(set_key) {
            None => Ok(0),
            Some(entry) if entry.is_expired(now) => Ok(0),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.len()),
            Some(_) => Err(SignalStoreError::WrongType(set_key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (MemorySignalStore, ManualClock) {
        let clock = ManualClock::default();
        (MemorySignalStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_increment_counts_and_expires() {
        let (store, clock) = store();

        assert_eq!(store.increment_with_expiry("c", 60).await.unwrap(), 1);
        assert_eq!(store.increment_with_expiry("c", 60).await.unwrap(), 2);

        clock.advance(Duration::seconds(60));
        // Expired exactly at the TTL boundary
        assert_eq!(store.increment_with_expiry("c", 60).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_refreshes_ttl() {
        let (store, clock) = store();

        store.increment_with_expiry("c", 60).await.unwrap();
        clock.advance(Duration::seconds(45));
        store.increment_with_expiry("c", 60).await.unwrap();
        clock.advance(Duration::seconds(45));

        // 90s after the first hit, but only 45s after the last one
        assert_eq!(store.increment_with_expiry("c", 60).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let (store, clock) = store();

        assert!(store.set_if_absent("k", "1", 300).await.unwrap());
        assert!(!store.set_if_absent("k", "1", 300).await.unwrap());

        clock.advance(Duration::seconds(301));
        assert!(store.set_if_absent("k", "1", 300).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_membership() {
        let (store, clock) = store();

        assert!(!store.is_member("s", "a").await.unwrap());
        assert!(store.add_member("s", "a", Some(10)).await.unwrap());
        assert!(!store.add_member("s", "a", Some(10)).await.unwrap());
        assert!(store.add_member("s", "b", Some(10)).await.unwrap());
        assert!(store.is_member("s", "a").await.unwrap());
        assert_eq!(store.cardinality("s").await.unwrap(), 2);

        clock.advance(Duration::seconds(10));
        assert!(!store.is_member("s", "a").await.unwrap());
        assert_eq!(store.cardinality("s").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_without_ttl_never_expires() {
        let (store, clock) = store();

        store.add_member("blacklist", "10.0.0.1", None).await.unwrap();
        clock.advance(Duration::days(365));
        assert!(store.is_member("blacklist", "10.0.0.1").await.unwrap());

        assert!(store.remove_member("blacklist", "10.0.0.1").await.unwrap());
        assert!(!store.remove_member("blacklist", "10.0.0.1").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let (store, _clock) = store();

        store.increment_with_expiry("k", 60).await.unwrap();
        assert_eq!(
            store.add_member("k", "x", None).await,
            Err(SignalStoreError::WrongType("k".to_string()))
        );
        assert!(store.cardinality("k").await.is_err());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, clock) = store();

        store.increment_with_expiry("short", 5).await.unwrap();
        store.set_if_absent("long", "1", 500).await.unwrap();
        clock.advance(Duration::seconds(6));

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let (store, _clock) = store();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment_with_expiry("hot", 60).await.unwrap()
            }));
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }
        seen.sort_unstable();

        assert_eq!(seen, (1..=50).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_concurrent_set_if_absent_has_one_winner() {
        let (store, _clock) = store();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set_if_absent("once", "1", 300).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
