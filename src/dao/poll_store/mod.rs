#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod lock;
pub mod memory;

use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dao::storage::StorageResult,
    state::poll::{PollSettings, PollState, QueuedPoll},
};

/// Result of an atomic vote increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The vote was counted; carries the option's new total.
    Counted { votes: u32 },
    /// One-vote-per-person is on and this chatter already voted.
    AlreadyVoted,
    /// The targeted poll is no longer the active one (or the option does not exist).
    PollChanged,
}

/// Result of pushing a start request onto the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePush {
    /// Accepted at the given 1-based position.
    Queued { position: usize },
    /// The queue already holds the configured maximum.
    Full,
}

/// Shared persistence for the poll record, its queue, settings and the ending lock.
///
/// Every invocation of the service is stateless; anything that must survive between
/// invocations goes through this contract.
pub trait PollStore: Send + Sync {
    /// Read the current poll record.
    fn load_poll(&self) -> BoxFuture<'static, StorageResult<PollState>>;
    /// Overwrite the current poll record unconditionally.
    fn save_poll(&self, state: PollState) -> BoxFuture<'static, StorageResult<()>>;
    /// Overwrite the poll record only if its id still equals `expected`.
    fn replace_poll_if(
        &self,
        expected: Option<Uuid>,
        next: PollState,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Atomically add one vote to `option_index` of the active poll `poll_id`.
    fn record_vote(
        &self,
        poll_id: Uuid,
        option_index: usize,
        voter: String,
        one_vote_per_person: bool,
    ) -> BoxFuture<'static, StorageResult<VoteOutcome>>;
    /// Attach the start announcement id to the active poll `poll_id`.
    fn set_start_message_id(
        &self,
        poll_id: Uuid,
        message_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// When the poll record was last written.
    fn last_modified(&self) -> BoxFuture<'static, StorageResult<Option<SystemTime>>>;
    /// Append to the FIFO queue unless it holds `max_len` entries already.
    fn push_queue(
        &self,
        poll: QueuedPoll,
        max_len: usize,
    ) -> BoxFuture<'static, StorageResult<QueuePush>>;
    /// Remove and return the oldest queued poll.
    fn pop_queue(&self) -> BoxFuture<'static, StorageResult<Option<QueuedPoll>>>;
    /// Queued polls, oldest first.
    fn list_queue(&self) -> BoxFuture<'static, StorageResult<Vec<QueuedPoll>>>;
    /// Set `key` if absent or expired, with the given time to live.
    fn try_acquire_lock(&self, key: String, ttl: Duration)
    -> BoxFuture<'static, StorageResult<bool>>;
    fn load_settings(&self) -> BoxFuture<'static, StorageResult<Option<PollSettings>>>;
    fn save_settings(&self, settings: PollSettings) -> BoxFuture<'static, StorageResult<()>>;
    /// When the last poll ended.
    fn last_ended_at(&self) -> BoxFuture<'static, StorageResult<Option<SystemTime>>>;
    fn mark_poll_ended(&self, at: SystemTime) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Apply a vote to `state` in place; shared by the backends so they count identically.
pub(crate) fn apply_vote(
    state: &mut PollState,
    poll_id: Uuid,
    option_index: usize,
    voter: &str,
    one_vote_per_person: bool,
) -> VoteOutcome {
    let PollState::Active(poll) = state else {
        return VoteOutcome::PollChanged;
    };
    if poll.id != poll_id || option_index >= poll.options.len() {
        return VoteOutcome::PollChanged;
    }

    if one_vote_per_person
        && poll
            .options
            .iter()
            .any(|option| option.voters.contains_key(voter))
    {
        return VoteOutcome::AlreadyVoted;
    }

    let votes = poll.options[option_index].add_vote(voter);
    VoteOutcome::Counted { votes }
}

/// Attach a start message id in place, returning whether `poll_id` was still active.
pub(crate) fn apply_start_message_id(
    state: &mut PollState,
    poll_id: Uuid,
    message_id: String,
) -> bool {
    match state {
        PollState::Active(poll) if poll.id == poll_id => {
            poll.start_message_id = Some(message_id);
            true
        }
        _ => false,
    }
}
