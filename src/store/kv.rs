//! Minimal key-value capability interface for the shared ledgers.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Backend-agnostic key-value store.
///
/// This is the only surface the dedup ledger, warn ledger, and credential
/// store touch. Correctness under concurrent duplicate deliveries rests
/// entirely on `set_if_absent` being atomic in the backend; no in-process
/// locking can substitute for it once several bridge instances share one
/// endpoint.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a live (non-expired) value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite a value. `ttl: None` means the entry never
    /// expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove a key. Returns whether a live entry existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomic test-and-set: claim `key` if it is absent or expired.
    ///
    /// Returns `true` when this caller won the claim. Concurrent calls with
    /// the same key must never both return `true` within one TTL window.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;
}
