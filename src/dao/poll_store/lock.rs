use std::time::{Duration, SystemTime};

use crate::dao::{poll_store::PollStore, storage::StorageResult};

/// Lock key guarding the overdue → winner transition.
pub const ENDING_LOCK_KEY: &str = "poll-ending";
/// Lock key guarding every queue pop that starts a poll outside an ending.
pub const PROMOTION_LOCK_KEY: &str = "poll-promotion";

/// Proof that this invocation won a store-backed lock.
///
/// There is no release; the lock lapses once its TTL passes.
#[derive(Debug, Clone)]
pub struct LockHandle {
    key: String,
    acquired_at: SystemTime,
    ttl: Duration,
}

impl LockHandle {
    /// Try to take `key` through the store's set-if-absent primitive.
    ///
    /// Returns `Ok(None)` when another invocation holds an unexpired lock.
    pub async fn acquire(
        store: &dyn PollStore,
        key: &str,
        ttl: Duration,
    ) -> StorageResult<Option<Self>> {
        let acquired_at = SystemTime::now();
        if store.try_acquire_lock(key.to_string(), ttl).await? {
            Ok(Some(Self {
                key: key.to_string(),
                acquired_at,
                ttl,
            }))
        } else {
            Ok(None)
        }
    }

    /// Store key this handle holds.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Instant after which other invocations may take the lock.
    pub fn expires_at(&self) -> SystemTime {
        self.acquired_at + self.ttl
    }

    /// Whether the TTL has run out at `now`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::poll_store::memory::MemoryPollStore;

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let store = MemoryPollStore::new();
        let ttl = Duration::from_secs(5);

        let first = LockHandle::acquire(&store, ENDING_LOCK_KEY, ttl)
            .await
            .unwrap();
        let handle = first.expect("first acquire wins");
        assert_eq!(handle.key(), ENDING_LOCK_KEY);
        assert!(!handle.is_expired(SystemTime::now()));

        let second = LockHandle::acquire(&store, ENDING_LOCK_KEY, ttl)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn expired_lock_can_be_taken_again() {
        let store = MemoryPollStore::new();

        let first = LockHandle::acquire(&store, ENDING_LOCK_KEY, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert!(first.is_expired(SystemTime::now()));

        let second = LockHandle::acquire(&store, ENDING_LOCK_KEY, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let store = MemoryPollStore::new();
        let ttl = Duration::from_secs(5);

        assert!(LockHandle::acquire(&store, "a", ttl).await.unwrap().is_some());
        assert!(LockHandle::acquire(&store, "b", ttl).await.unwrap().is_some());
    }
}
