//! Drives the shared poll record through `active → winner → (cleared | next active)`.
//!
//! Any number of triggers may call into this module at the same time from different
//! processes. Ending a poll is guarded twice: the store-backed ending lock keeps a second
//! trigger out while the first one decides, and every write that replaces the record is
//! conditioned on the poll id that was read, so a trigger holding a stale snapshot can never
//! overwrite a newer poll. Starting a poll from a displayed winner or an empty record goes
//! through the promotion lock instead, so queue pops never interleave.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::poll_store::{
        PollStore, QueuePush, VoteOutcome,
        lock::{ENDING_LOCK_KEY, LockHandle, PROMOTION_LOCK_KEY},
    },
    error::ServiceError,
    services::{
        announcer::ChatAnnouncer,
        command_parser::{PollRequest, Vote},
        tally::compute_poll_result,
    },
    state::{
        poll::{ActivePoll, PollSettings, PollState, QueuedPoll},
        state_machine::PollEvent,
    },
};

/// Attempts made to activate a start request when other writers keep replacing the record.
const START_ATTEMPTS: usize = 3;

/// Result of an overdue check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOutcome {
    /// Nothing was overdue, or another trigger holds the ending lock.
    NoAction,
    /// The poll ended and its winner is now on display.
    Ended { winner_message: String },
    /// The poll ended and the oldest queued poll replaced it.
    Promoted {
        winner_message: String,
        next_poll_id: Uuid,
    },
    /// The record changed under us after the lock was taken; nothing was written.
    Abandoned,
}

impl EndOutcome {
    /// Whether this call performed the transition.
    pub fn acted(&self) -> bool {
        matches!(self, EndOutcome::Ended { .. } | EndOutcome::Promoted { .. })
    }
}

/// Action performed by a periodic sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// An overdue poll was ended.
    EndedActive,
    /// The oldest queued poll became active.
    StartedQueued,
    /// The winner display ended with nothing queued.
    Cleared,
    /// Nothing to do, or another trigger got there first.
    None,
}

/// Result of a poll start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The poll is now active.
    Started { poll_id: Uuid },
    /// A poll is active or others are waiting; the request waits at `position` (1-based).
    Queued { position: usize },
    /// The request had to wait but the queue is at its bound.
    QueueFull,
}

/// Result of a vote attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteResult {
    /// Counted; carries the option label and its new total.
    Counted { option: String, votes: u32 },
    /// The chatter already voted in one-vote-per-person mode.
    AlreadyVoted,
    /// No active poll, the poll is overdue, or it changed before the vote landed.
    NoActivePoll,
}

/// Lifecycle operations bound to one poll store and one chat announcer.
#[derive(Clone)]
pub struct PollLifecycle {
    store: Arc<dyn PollStore>,
    announcer: Arc<dyn ChatAnnouncer>,
    lock_ttl: Duration,
    defaults: PollSettings,
}

impl PollLifecycle {
    /// Bind lifecycle operations to `store`; `defaults` apply until settings are saved.
    pub fn new(
        store: Arc<dyn PollStore>,
        announcer: Arc<dyn ChatAnnouncer>,
        lock_ttl: Duration,
        defaults: PollSettings,
    ) -> Self {
        Self {
            store,
            announcer,
            lock_ttl,
            defaults,
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn PollStore> {
        &self.store
    }

    /// Current poll record.
    pub async fn current(&self) -> Result<PollState, ServiceError> {
        Ok(self.store.load_poll().await?)
    }

    /// Queued polls, oldest first.
    pub async fn queue(&self) -> Result<Vec<QueuedPoll>, ServiceError> {
        Ok(self.store.list_queue().await?)
    }

    /// Stored settings, or the configured defaults when none were saved yet.
    pub async fn settings(&self) -> Result<PollSettings, ServiceError> {
        Ok(self
            .store
            .load_settings()
            .await?
            .unwrap_or_else(|| self.defaults.clone()))
    }

    /// End the active poll if it is overdue.
    pub async fn end_if_overdue(&self, now: SystemTime) -> Result<EndOutcome, ServiceError> {
        match self.store.load_poll().await? {
            PollState::Active(poll) if poll.is_overdue(now) => self.finish_overdue(poll, now).await,
            _ => Ok(EndOutcome::NoAction),
        }
    }

    /// End `observed`, an overdue poll read by the caller.
    pub(crate) async fn finish_overdue(
        &self,
        observed: ActivePoll,
        now: SystemTime,
    ) -> Result<EndOutcome, ServiceError> {
        let Some(lock) = LockHandle::acquire(self.store.as_ref(), ENDING_LOCK_KEY, self.lock_ttl).await?
        else {
            debug!(poll_id = %observed.id, "ending lock held elsewhere; skipping");
            return Ok(EndOutcome::NoAction);
        };

        // Votes may have landed since the caller's read; tally the latest copy.
        let poll = match self.store.load_poll().await? {
            PollState::Active(poll) if poll.id == observed.id => poll,
            _ => {
                debug!(poll_id = %observed.id, "poll already handled; abandoning");
                return Ok(EndOutcome::Abandoned);
            }
        };

        let settings = self.settings().await?;
        let result = compute_poll_result(&poll.question, &poll.options);
        let poll_id = poll.id;

        match self.store.pop_queue().await? {
            Some(queued) => {
                let next = ActivePoll::from_queued(queued, now);
                let next_id = next.id;
                if !self
                    .store
                    .replace_poll_if(Some(poll_id), PollState::Active(next.clone()))
                    .await?
                {
                    warn!(
                        poll_id = %poll_id,
                        "poll replaced while promoting; queued poll dropped"
                    );
                    return Ok(EndOutcome::Abandoned);
                }
                self.mark_ended(now).await;
                info!(
                    poll_id = %poll_id,
                    next_poll_id = %next_id,
                    lock_expires_at = ?lock.expires_at(),
                    "poll ended; queued poll promoted"
                );

                if self.stream_is_live().await {
                    self.announce(result.winner_message.clone()).await;
                    self.announce_start(&next).await;
                } else {
                    debug!(poll_id = %poll_id, "stream offline; announcements skipped");
                }

                Ok(EndOutcome::Promoted {
                    winner_message: result.winner_message,
                    next_poll_id: next_id,
                })
            }
            None => {
                if self.store.load_poll().await?.id() != Some(poll_id) {
                    debug!(poll_id = %poll_id, "poll changed before winner write; abandoning");
                    return Ok(EndOutcome::Abandoned);
                }
                let display_until = now
                    .checked_add(Duration::from_secs(settings.winner_display_seconds))
                    .unwrap_or(now);
                let finished = poll.into_winner(result.clone(), display_until);
                if !self
                    .store
                    .replace_poll_if(Some(poll_id), PollState::Winner(finished))
                    .await?
                {
                    debug!(poll_id = %poll_id, "poll changed during winner write; abandoning");
                    return Ok(EndOutcome::Abandoned);
                }
                self.mark_ended(now).await;
                info!(poll_id = %poll_id, "poll ended; winner on display");

                self.announce(result.winner_message.clone()).await;
                Ok(EndOutcome::Ended {
                    winner_message: result.winner_message,
                })
            }
        }
    }

    /// Periodic sweep: end an overdue poll, or start the next one once nothing is on display.
    pub async fn sweep(&self, now: SystemTime) -> Result<SweepAction, ServiceError> {
        match self.store.load_poll().await? {
            PollState::Active(poll) if poll.is_overdue(now) => {
                let outcome = self.finish_overdue(poll, now).await?;
                Ok(if outcome.acted() {
                    SweepAction::EndedActive
                } else {
                    SweepAction::None
                })
            }
            PollState::Winner(finished) if finished.display_elapsed(now) => {
                self.advance(PollState::Winner(finished), now).await
            }
            // Polls queued while a start held the promotion lock.
            PollState::Empty => {
                if self.store.list_queue().await?.is_empty() {
                    Ok(SweepAction::None)
                } else {
                    self.advance(PollState::Empty, now).await
                }
            }
            _ => Ok(SweepAction::None),
        }
    }

    /// Promote the oldest queued poll, or clear a winner whose display is over.
    ///
    /// The queue is only popped under the promotion lock and after `observed` is confirmed to
    /// still be the stored record.
    async fn advance(
        &self,
        observed: PollState,
        now: SystemTime,
    ) -> Result<SweepAction, ServiceError> {
        let Some(_lock) =
            LockHandle::acquire(self.store.as_ref(), PROMOTION_LOCK_KEY, self.lock_ttl).await?
        else {
            debug!(poll_id = ?observed.id(), "promotion lock held elsewhere; skipping");
            return Ok(SweepAction::None);
        };

        let current = self.store.load_poll().await?;
        if current.phase() != observed.phase() || current.id() != observed.id() {
            debug!(poll_id = ?observed.id(), "poll record moved on; skipping promotion");
            return Ok(SweepAction::None);
        }

        match self.store.pop_queue().await? {
            Some(queued) => {
                let next = ActivePoll::from_queued(queued, now);
                if !self
                    .store
                    .replace_poll_if(observed.id(), PollState::Active(next.clone()))
                    .await?
                {
                    warn!(poll_id = ?observed.id(), "poll replaced while promoting; queued poll dropped");
                    return Ok(SweepAction::None);
                }
                info!(poll_id = %next.id, "queued poll started");
                if self.stream_is_live().await {
                    self.announce_start(&next).await;
                }
                Ok(SweepAction::StartedQueued)
            }
            None => {
                let PollState::Winner(finished) = observed else {
                    return Ok(SweepAction::None);
                };
                if !self
                    .store
                    .replace_poll_if(Some(finished.id), PollState::Empty)
                    .await?
                {
                    return Ok(SweepAction::None);
                }
                info!(poll_id = %finished.id, "winner display over; poll cleared");
                Ok(SweepAction::Cleared)
            }
        }
    }

    /// Start a poll, or queue it behind the active poll and anything already waiting.
    ///
    /// A displayed winner is replaced right away when the queue is empty.
    pub async fn start_or_enqueue(
        &self,
        request: PollRequest,
        settings: &PollSettings,
        now: SystemTime,
    ) -> Result<StartOutcome, ServiceError> {
        let queued = QueuedPoll::new(request.question, request.options, settings.duration_seconds);

        let current = self.store.load_poll().await?;
        if current.phase().apply(PollEvent::Started).is_err() {
            return self.enqueue(queued, settings, current.id()).await;
        }
        if !self.store.list_queue().await?.is_empty() {
            return self.enqueue(queued, settings, current.id()).await;
        }
        let Some(_lock) =
            LockHandle::acquire(self.store.as_ref(), PROMOTION_LOCK_KEY, self.lock_ttl).await?
        else {
            debug!("promotion in progress; queuing start request");
            return self.enqueue(queued, settings, current.id()).await;
        };

        for _ in 0..START_ATTEMPTS {
            let current = self.store.load_poll().await?;
            if current.phase().apply(PollEvent::Started).is_err()
                || !self.store.list_queue().await?.is_empty()
            {
                return self.enqueue(queued, settings, current.id()).await;
            }

            let poll = ActivePoll::from_queued(queued.clone(), now);
            if self
                .store
                .replace_poll_if(current.id(), PollState::Active(poll.clone()))
                .await?
            {
                info!(poll_id = %poll.id, question = %poll.question, "poll started");
                if self.stream_is_live().await {
                    self.announce_start(&poll).await;
                }
                return Ok(StartOutcome::Started { poll_id: poll.id });
            }
            debug!("poll record changed while starting; retrying");
        }

        Err(ServiceError::InvalidState(
            "poll record kept changing while starting a poll".into(),
        ))
    }

    async fn enqueue(
        &self,
        queued: QueuedPoll,
        settings: &PollSettings,
        current: Option<Uuid>,
    ) -> Result<StartOutcome, ServiceError> {
        match self
            .store
            .push_queue(queued, settings.max_queued_polls)
            .await?
        {
            QueuePush::Queued { position } => {
                info!(current_poll_id = ?current, position, "poll queued");
                Ok(StartOutcome::Queued { position })
            }
            QueuePush::Full => {
                debug!(current_poll_id = ?current, "poll queue full");
                Ok(StartOutcome::QueueFull)
            }
        }
    }

    /// Count `vote` against `poll`, which the caller read as active.
    pub async fn cast_vote(
        &self,
        poll: &ActivePoll,
        vote: Vote,
        one_vote_per_person: bool,
    ) -> Result<VoteResult, ServiceError> {
        let Some(option) = poll.options.get(vote.option_index) else {
            return Ok(VoteResult::NoActivePoll);
        };
        let label = option.label.clone();
        let outcome = self
            .store
            .record_vote(poll.id, vote.option_index, vote.voter, one_vote_per_person)
            .await?;
        Ok(match outcome {
            VoteOutcome::Counted { votes } => VoteResult::Counted {
                option: label,
                votes,
            },
            VoteOutcome::AlreadyVoted => VoteResult::AlreadyVoted,
            VoteOutcome::PollChanged => VoteResult::NoActivePoll,
        })
    }

    /// Drop the current poll and every queued poll. Returns how many queued polls were discarded.
    pub async fn clear(&self) -> Result<usize, ServiceError> {
        let current = self.store.load_poll().await?;
        self.store.save_poll(PollState::Empty).await?;

        let mut discarded = 0;
        while self.store.pop_queue().await?.is_some() {
            discarded += 1;
        }
        info!(poll_id = ?current.id(), discarded, "poll cleared by admin");
        Ok(discarded)
    }

    async fn stream_is_live(&self) -> bool {
        match self.announcer.is_live().await {
            Ok(live) => live,
            Err(err) => {
                warn!(error = %err, "failed to read stream status; treating as offline");
                false
            }
        }
    }

    async fn announce(&self, text: String) -> Option<String> {
        match self.announcer.send_message(text).await {
            Ok(message_id) => message_id,
            Err(err) => {
                warn!(error = %err, "chat announcement failed");
                None
            }
        }
    }

    async fn announce_start(&self, poll: &ActivePoll) {
        let Some(message_id) = self.announce(start_message(poll)).await else {
            return;
        };
        if let Err(err) = self.store.set_start_message_id(poll.id, message_id).await {
            warn!(poll_id = %poll.id, error = %err, "failed to record start message id");
        }
    }

    async fn mark_ended(&self, at: SystemTime) {
        if let Err(err) = self.store.mark_poll_ended(at).await {
            warn!(error = %err, "failed to record poll end marker");
        }
    }
}

/// Chat line announcing a freshly started poll.
pub fn start_message(poll: &ActivePoll) -> String {
    let choices = poll
        .options
        .iter()
        .map(|option| format!("!{}", option.label))
        .collect::<Vec<_>>()
        .join(" / ");
    format!(
        "New poll: {} Vote with {choices} ({}s)",
        poll.question, poll.duration_seconds
    )
}
