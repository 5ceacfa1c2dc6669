// Concurrency Lock Store Port

use crate::domain::{ConcurrencyLock, LockAcquisition};
use crate::error::Result;
use async_trait::async_trait;

/// Lease-based locks keyed by scope.
///
/// `try_acquire` must be a single atomic insert-if-absent-or-expired,
/// never a read followed by a write.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create collections/indexes (idempotent)
    async fn initialize(&self) -> Result<()>;

    /// Acquire `scope` for `owner` for `lease_ms`.
    ///
    /// Succeeds when the scope is free, its lock expired, or `owner` already
    /// holds it (the lease is refreshed).
    async fn try_acquire(&self, scope: &str, owner: &str, lease_ms: i64) -> Result<LockAcquisition>;

    /// Extend a lock still held by `owner`
    async fn extend(&self, scope: &str, owner: &str, lease_ms: i64) -> Result<bool>;

    /// Release a lock held by `owner`; a lock taken over by someone else is left alone
    async fn release(&self, scope: &str, owner: &str) -> Result<bool>;

    async fn find(&self, scope: &str) -> Result<Option<ConcurrencyLock>>;

    /// Remove every lock (test teardown)
    async fn clear(&self) -> Result<()>;
}
