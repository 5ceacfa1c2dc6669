// Concurrency Lock Domain Model

use serde::{Deserialize, Serialize};

/// What a lock protects.
///
/// Job leases are carried on the job document itself (`locked_by` /
/// `locked_until`); the scopes here cover wider units such as a queue
/// partition during batch claiming.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockScope {
    Job(String),
    Queue(String),
    Batch(String),
}

impl LockScope {
    /// Storage key for the scope
    pub fn key(&self) -> String {
        match self {
            LockScope::Job(id) => format!("job:{}", id),
            LockScope::Queue(name) => format!("queue:{}", name),
            LockScope::Batch(token) => format!("batch:{}", token),
        }
    }
}

impl std::fmt::Display for LockScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// A live (or formerly live) lock record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyLock {
    pub scope: String,
    pub owner_id: String,
    pub acquired_at: i64,
    pub expires_at: i64,
}

impl ConcurrencyLock {
    pub fn is_live(&self, now_millis: i64) -> bool {
        self.expires_at > now_millis
    }
}

/// Outcome of a lock attempt. Contention is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    Acquired(ConcurrencyLock),
    AlreadyLocked,
}

impl LockAcquisition {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockAcquisition::Acquired(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_keys_are_distinct() {
        assert_eq!(LockScope::Job("1".into()).key(), "job:1");
        assert_eq!(LockScope::Queue("1".into()).key(), "queue:1");
        assert_eq!(LockScope::Batch("1".into()).key(), "batch:1");
    }

    #[test]
    fn test_lock_liveness() {
        let lock = ConcurrencyLock {
            scope: "queue:app-queue".into(),
            owner_id: "worker-a".into(),
            acquired_at: 0,
            expires_at: 1_000,
        };
        assert!(lock.is_live(999));
        assert!(!lock.is_live(1_000));
    }
}
