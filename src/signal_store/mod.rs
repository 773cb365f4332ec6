//! Signal store
//!
//! Key-value store of counters, flags and string sets with per-key TTL. All
//! fraud detectors share one store but write to disjoint key namespaces.
//! Operations are atomic per key; callers decide whether to refresh the TTL on
//! each call.

mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemorySignalStore;

/// Signal store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalStoreError {
    #[error("Signal store unavailable: {0}")]
    Unavailable(String),

    #[error("Key '{0}' holds a value of a different type")]
    WrongType(String),
}

/// Counter/set store used by the detectors
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Increment the counter at `key` and (re)set its TTL. Returns the new count.
    async fn increment_with_expiry(
        &self,
        key: &str,
        ttl_seconds: u64,
    ) -> Result<i64, SignalStoreError>;

    /// Store `value` only if `key` is absent. Returns whether the value was set.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, SignalStoreError>;

    async fn is_member(&self, set_key: &str, member: &str) -> Result<bool, SignalStoreError>;

    /// Add `member` to the set. With `Some(ttl)` the whole set's TTL is
    /// refreshed; with `None` the existing expiry is left untouched.
    /// Returns whether the member was new.
    async fn add_member(
        &self,
        set_key: &str,
        member: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, SignalStoreError>;

    /// Returns whether the member was present
    async fn remove_member(&self, set_key: &str, member: &str) -> Result<bool, SignalStoreError>;

    async fn cardinality(&self, set_key: &str) -> Result<usize, SignalStoreError>;
}
