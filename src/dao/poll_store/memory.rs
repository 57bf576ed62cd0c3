use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, SystemTime},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    dao::{
        poll_store::{PollStore, QueuePush, VoteOutcome, apply_start_message_id, apply_vote},
        storage::{StorageError, StorageResult},
    },
    state::poll::{PollSettings, PollState, QueuedPoll},
};

/// Process-local poll store.
///
/// Every operation that touches the poll record or the queue runs under one mutex, which
/// gives the same atomicity the shared backends provide through compare-and-set.
#[derive(Clone, Default)]
pub struct MemoryPollStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    state: Mutex<MemoryState>,
    locks: DashMap<String, SystemTime>,
}

#[derive(Default)]
struct MemoryState {
    poll: PollState,
    modified_at: Option<SystemTime>,
    queue: VecDeque<QueuedPoll>,
    settings: Option<PollSettings>,
    last_ended_at: Option<SystemTime>,
}

impl MemoryState {
    fn write_poll(&mut self, next: PollState) {
        self.poll = next;
        self.modified_at = Some(SystemTime::now());
    }
}

impl MemoryPollStore {
    /// Empty store: no poll, no queue, no saved settings.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PollStore for MemoryPollStore {
    fn load_poll(&self) -> BoxFuture<'static, StorageResult<PollState>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.state.lock().await.poll.clone()) })
    }

    fn save_poll(&self, state: PollState) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.state.lock().await.write_poll(state);
            Ok(())
        })
    }

    fn replace_poll_if(
        &self,
        expected: Option<Uuid>,
        next: PollState,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.state.lock().await;
            if guard.poll.id() != expected {
                return Ok(false);
            }
            guard.write_poll(next);
            Ok(true)
        })
    }

    fn record_vote(
        &self,
        poll_id: Uuid,
        option_index: usize,
        voter: String,
        one_vote_per_person: bool,
    ) -> BoxFuture<'static, StorageResult<VoteOutcome>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.state.lock().await;
            let outcome = apply_vote(
                &mut guard.poll,
                poll_id,
                option_index,
                &voter,
                one_vote_per_person,
            );
            if matches!(outcome, VoteOutcome::Counted { .. }) {
                guard.modified_at = Some(SystemTime::now());
            }
            Ok(outcome)
        })
    }

    fn set_start_message_id(
        &self,
        poll_id: Uuid,
        message_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.state.lock().await;
            Ok(apply_start_message_id(&mut guard.poll, poll_id, message_id))
        })
    }

    fn last_modified(&self) -> BoxFuture<'static, StorageResult<Option<SystemTime>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.state.lock().await.modified_at) })
    }

    fn push_queue(
        &self,
        poll: QueuedPoll,
        max_len: usize,
    ) -> BoxFuture<'static, StorageResult<QueuePush>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.state.lock().await;
            if guard.queue.len() >= max_len {
                return Ok(QueuePush::Full);
            }
            guard.queue.push_back(poll);
            Ok(QueuePush::Queued {
                position: guard.queue.len(),
            })
        })
    }

    fn pop_queue(&self) -> BoxFuture<'static, StorageResult<Option<QueuedPoll>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.state.lock().await.queue.pop_front()) })
    }

    fn list_queue(&self) -> BoxFuture<'static, StorageResult<Vec<QueuedPoll>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.state.lock().await.queue.iter().cloned().collect()) })
    }

    fn try_acquire_lock(
        &self,
        key: String,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let now = SystemTime::now();
            let Some(expires_at) = now.checked_add(ttl) else {
                return Err(StorageError::LockTtl { key, ttl });
            };
            let acquired = match inner.locks.entry(key) {
                Entry::Occupied(mut entry) => {
                    if *entry.get() > now {
                        false
                    } else {
                        entry.insert(expires_at);
                        true
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(expires_at);
                    true
                }
            };
            Ok(acquired)
        })
    }

    fn load_settings(&self) -> BoxFuture<'static, StorageResult<Option<PollSettings>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.state.lock().await.settings.clone()) })
    }

    fn save_settings(&self, settings: PollSettings) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.state.lock().await.settings = Some(settings);
            Ok(())
        })
    }

    fn last_ended_at(&self) -> BoxFuture<'static, StorageResult<Option<SystemTime>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.state.lock().await.last_ended_at) })
    }

    fn mark_poll_ended(&self, at: SystemTime) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.state.lock().await.last_ended_at = Some(at);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::poll::ActivePoll;

    fn queued(question: &str) -> QueuedPoll {
        QueuedPoll::new(question, vec!["A".into(), "B".into()], 60)
    }

    async fn store_with_active() -> (MemoryPollStore, Uuid) {
        let store = MemoryPollStore::new();
        let poll = ActivePoll::from_queued(queued("Q?"), SystemTime::now());
        let id = poll.id;
        store.save_poll(PollState::Active(poll)).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn queue_is_fifo_and_bounded() {
        let store = MemoryPollStore::new();

        assert_eq!(
            store.push_queue(queued("first?"), 2).await.unwrap(),
            QueuePush::Queued { position: 1 }
        );
        assert_eq!(
            store.push_queue(queued("second?"), 2).await.unwrap(),
            QueuePush::Queued { position: 2 }
        );
        assert_eq!(
            store.push_queue(queued("third?"), 2).await.unwrap(),
            QueuePush::Full
        );

        assert_eq!(store.pop_queue().await.unwrap().unwrap().question, "first?");
        assert_eq!(store.pop_queue().await.unwrap().unwrap().question, "second?");
        assert!(store.pop_queue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replace_poll_if_compares_ids() {
        let (store, id) = store_with_active().await;

        assert!(!store.replace_poll_if(None, PollState::Empty).await.unwrap());
        assert!(!store
            .replace_poll_if(Some(Uuid::new_v4()), PollState::Empty)
            .await
            .unwrap());
        assert_eq!(store.load_poll().await.unwrap().id(), Some(id));

        assert!(store.replace_poll_if(Some(id), PollState::Empty).await.unwrap());
        assert_eq!(store.load_poll().await.unwrap(), PollState::Empty);
    }

    #[tokio::test]
    async fn one_vote_per_person_rejects_repeat_voters() {
        let (store, id) = store_with_active().await;

        assert_eq!(
            store.record_vote(id, 0, "alice".into(), true).await.unwrap(),
            VoteOutcome::Counted { votes: 1 }
        );
        assert_eq!(
            store.record_vote(id, 1, "alice".into(), true).await.unwrap(),
            VoteOutcome::AlreadyVoted
        );
        assert_eq!(
            store.record_vote(id, 0, "alice".into(), true).await.unwrap(),
            VoteOutcome::AlreadyVoted
        );
    }

    #[tokio::test]
    async fn unlimited_mode_counts_every_message() {
        let (store, id) = store_with_active().await;

        for _ in 0..3 {
            store.record_vote(id, 1, "bob".into(), false).await.unwrap();
        }

        let PollState::Active(poll) = store.load_poll().await.unwrap() else {
            panic!("poll should still be active");
        };
        assert_eq!(poll.options[1].votes, 3);
        assert_eq!(poll.options[1].voters.get("bob"), Some(&3));
    }

    #[tokio::test]
    async fn votes_for_another_poll_are_rejected() {
        let (store, _) = store_with_active().await;

        assert_eq!(
            store
                .record_vote(Uuid::new_v4(), 0, "alice".into(), true)
                .await
                .unwrap(),
            VoteOutcome::PollChanged
        );
    }

    #[tokio::test]
    async fn concurrent_votes_are_not_lost() {
        let (store, id) = store_with_active().await;

        let mut handles = Vec::new();
        for n in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .record_vote(id, n % 2, format!("viewer{n}"), true)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let PollState::Active(poll) = store.load_poll().await.unwrap() else {
            panic!("poll should still be active");
        };
        let total: u32 = poll.options.iter().map(|option| option.votes).sum();
        assert_eq!(total, 50);
    }

    #[tokio::test]
    async fn unrepresentable_lock_ttl_is_an_error() {
        let store = MemoryPollStore::new();
        let err = store
            .try_acquire_lock("k".into(), Duration::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::LockTtl { .. }));
        assert!(store.try_acquire_lock("k".into(), Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn writes_bump_last_modified() {
        let store = MemoryPollStore::new();
        assert!(store.last_modified().await.unwrap().is_none());

        store.save_poll(PollState::Empty).await.unwrap();
        assert!(store.last_modified().await.unwrap().is_some());
    }
}
