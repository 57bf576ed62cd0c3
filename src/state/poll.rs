use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::state_machine::PollPhase;

/// A single answer of a poll together with its running tally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollOption {
    /// Label shown to viewers and matched against chat votes.
    pub label: String,
    /// Total votes received by this option.
    pub votes: u32,
    /// Votes per chatter, in first-vote order.
    #[serde(default)]
    pub voters: IndexMap<String, u32>,
}

impl PollOption {
    /// Build an option with a zeroed tally.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            votes: 0,
            voters: IndexMap::new(),
        }
    }

    /// Count one vote from `voter`, keeping `votes` equal to the sum of `voters`.
    pub fn add_vote(&mut self, voter: &str) -> u32 {
        *self.voters.entry(voter.to_string()).or_insert(0) += 1;
        self.votes += 1;
        self.votes
    }
}

/// Poll currently accepting votes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivePoll {
    /// Identifier, regenerated every time a poll becomes active.
    pub id: Uuid,
    /// Question, including its trailing `?` when one was typed.
    pub question: String,
    /// Options in display order.
    pub options: Vec<PollOption>,
    /// When voting opened.
    pub started_at: SystemTime,
    /// How long voting stays open.
    pub duration_seconds: u64,
    /// Chat message id of the start announcement, once delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_message_id: Option<String>,
}

impl ActivePoll {
    /// Activate a queued poll definition with fresh identity and zeroed votes.
    pub fn from_queued(queued: QueuedPoll, now: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: queued.question,
            options: queued
                .options
                .into_iter()
                .map(|option| PollOption::new(option.label))
                .collect(),
            started_at: now,
            duration_seconds: queued.duration_seconds,
            start_message_id: None,
        }
    }

    /// Instant at which voting closes; `None` when it lies beyond what `SystemTime` holds.
    pub fn ends_at(&self) -> Option<SystemTime> {
        self.started_at
            .checked_add(Duration::from_secs(self.duration_seconds))
    }

    /// Whether the elapsed time since start meets or exceeds the duration.
    pub fn is_overdue(&self, now: SystemTime) -> bool {
        now.duration_since(self.started_at)
            .map(|elapsed| elapsed >= Duration::from_secs(self.duration_seconds))
            .unwrap_or(false)
    }

    /// Time left before the poll becomes overdue.
    pub fn remaining(&self, now: SystemTime) -> Duration {
        let elapsed = now.duration_since(self.started_at).unwrap_or(Duration::ZERO);
        Duration::from_secs(self.duration_seconds).saturating_sub(elapsed)
    }

    /// Freeze the poll with its computed result.
    pub fn into_winner(self, result: PollResult, display_until: SystemTime) -> FinishedPoll {
        FinishedPoll {
            id: self.id,
            question: self.question,
            options: self.options,
            started_at: self.started_at,
            duration_seconds: self.duration_seconds,
            winner_message: result.winner_message,
            display_until,
            top_voter: result.top_voter,
        }
    }
}

/// Poll whose voting window closed and whose winner is on display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinishedPoll {
    /// Identifier the poll had while active.
    pub id: Uuid,
    /// Question as asked.
    pub question: String,
    /// Options with their final tallies.
    pub options: Vec<PollOption>,
    /// When voting opened.
    pub started_at: SystemTime,
    /// Length of the voting window.
    pub duration_seconds: u64,
    /// Announcement sent to chat when the poll ended.
    pub winner_message: String,
    /// Overlay keeps showing the winner until this instant.
    pub display_until: SystemTime,
    /// Most active chatter, when one stood out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_voter: Option<TopVoter>,
}

impl FinishedPoll {
    /// Whether the winner display window is over.
    pub fn display_elapsed(&self, now: SystemTime) -> bool {
        now >= self.display_until
    }
}

/// The single shared poll record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollState {
    /// No poll running or displayed.
    #[default]
    Empty,
    /// Voting is open.
    Active(ActivePoll),
    /// Voting closed; the winner is displayed.
    Winner(FinishedPoll),
}

impl PollState {
    /// Identifier of the poll held in this record, if any.
    pub fn id(&self) -> Option<Uuid> {
        match self {
            PollState::Empty => None,
            PollState::Active(poll) => Some(poll.id),
            PollState::Winner(poll) => Some(poll.id),
        }
    }

    /// Lifecycle phase of this record.
    pub fn phase(&self) -> PollPhase {
        match self {
            PollState::Empty => PollPhase::Idle,
            PollState::Active(_) => PollPhase::Active,
            PollState::Winner(_) => PollPhase::Winner,
        }
    }
}

/// Poll definition waiting for the current poll to finish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuedPoll {
    /// Question to ask once the poll starts.
    pub question: String,
    /// Options, all at zero votes.
    pub options: Vec<PollOption>,
    /// Voting window captured from the settings at request time.
    pub duration_seconds: u64,
}

impl QueuedPoll {
    /// Build a queued definition with zeroed options.
    pub fn new(question: impl Into<String>, labels: Vec<String>, duration_seconds: u64) -> Self {
        Self {
            question: question.into(),
            options: labels.into_iter().map(PollOption::new).collect(),
            duration_seconds,
        }
    }
}

/// Chatter with the most votes across all options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TopVoter {
    /// Chat login of the voter.
    pub username: String,
    /// Votes cast across all options.
    pub count: u32,
}

/// Outcome of tallying a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    /// Chat announcement naming the winner(s).
    pub winner_message: String,
    /// Most active chatter, if any.
    pub top_voter: Option<TopVoter>,
}

/// Poll behaviour owned by the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollSettings {
    /// Voting window for newly started polls.
    pub duration_seconds: u64,
    /// Any chatter may start polls.
    pub everyone_can_start: bool,
    /// Moderators may start polls.
    pub mods_can_start: bool,
    /// VIPs may start polls.
    pub vips_can_start: bool,
    /// Long-time regulars may start polls.
    pub ogs_can_start: bool,
    /// Subscribers may start polls.
    pub subs_can_start: bool,
    /// Upper bound of the poll queue.
    pub max_queued_polls: usize,
    /// How long the winner stays on the overlay.
    pub winner_display_seconds: u64,
    /// Only the first vote of each chatter counts when enabled.
    pub one_vote_per_person: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            duration_seconds: 60,
            everyone_can_start: false,
            mods_can_start: true,
            vips_can_start: false,
            ogs_can_start: false,
            subs_can_start: false,
            max_queued_polls: 3,
            winner_display_seconds: 10,
            one_vote_per_person: true,
        }
    }
}

/// Role flags resolved upstream by the chat webhook layer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(default)]
pub struct ChatRoles {
    /// Sender owns the channel.
    pub broadcaster: bool,
    /// Sender is a channel moderator.
    pub moderator: bool,
    /// Sender holds the VIP badge.
    pub vip: bool,
    /// Sender is a long-time regular.
    pub og: bool,
    /// Sender is subscribed.
    pub subscriber: bool,
}
