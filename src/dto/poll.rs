use std::time::SystemTime;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_system_time,
    services::{lifecycle::SweepAction, tally::overlay_winner_text},
    state::poll::{PollOption, PollState, QueuedPoll, TopVoter},
};

/// Lifecycle status as shown to the overlay.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Empty,
    Active,
    Winner,
}

/// One option with its tally.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollOptionView {
    pub label: String,
    pub votes: u32,
    /// Share of all votes, rounded down.
    pub percentage: u32,
}

/// Everything the overlay needs to render the current poll.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollSnapshot {
    pub status: PollStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub options: Vec<PollOptionView>,
    pub total_votes: u32,
    /// RFC 3339 start time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// Seconds of voting left; only present while active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u64>,
    /// Compact winner line, e.g. `A & B wins (3)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_until: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_voter: Option<TopVoter>,
    pub queue_length: usize,
    /// Last write to the poll record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// When the previous poll ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ended_at: Option<String>,
}

impl PollSnapshot {
    /// Render `state` as seen at `now`.
    pub fn from_state(state: &PollState, queue_length: usize, now: SystemTime) -> Self {
        let empty = Self {
            status: PollStatus::Empty,
            id: None,
            question: None,
            options: Vec::new(),
            total_votes: 0,
            started_at: None,
            remaining_seconds: None,
            winner_text: None,
            winner_message: None,
            display_until: None,
            top_voter: None,
            queue_length,
            updated_at: None,
            last_ended_at: None,
        };

        match state {
            PollState::Empty => empty,
            PollState::Active(poll) => Self {
                status: PollStatus::Active,
                id: Some(poll.id),
                question: Some(poll.question.clone()),
                options: option_views(&poll.options),
                total_votes: total_votes(&poll.options),
                started_at: Some(format_system_time(poll.started_at)),
                remaining_seconds: Some(poll.remaining(now).as_secs()),
                ..empty
            },
            PollState::Winner(poll) => Self {
                status: PollStatus::Winner,
                id: Some(poll.id),
                question: Some(poll.question.clone()),
                options: option_views(&poll.options),
                total_votes: total_votes(&poll.options),
                started_at: Some(format_system_time(poll.started_at)),
                winner_text: Some(overlay_winner_text(&poll.options)),
                winner_message: Some(poll.winner_message.clone()),
                display_until: Some(format_system_time(poll.display_until)),
                top_voter: poll.top_voter.clone(),
                ..empty
            },
        }
    }

    /// Attach the store markers.
    pub fn with_markers(
        mut self,
        updated_at: Option<SystemTime>,
        last_ended_at: Option<SystemTime>,
    ) -> Self {
        self.updated_at = updated_at.map(format_system_time);
        self.last_ended_at = last_ended_at.map(format_system_time);
        self
    }
}

fn total_votes(options: &[PollOption]) -> u32 {
    options.iter().map(|option| option.votes).sum()
}

fn option_views(options: &[PollOption]) -> Vec<PollOptionView> {
    let total = total_votes(options);
    options
        .iter()
        .map(|option| PollOptionView {
            label: option.label.clone(),
            votes: option.votes,
            percentage: if total == 0 {
                0
            } else {
                option.votes * 100 / total
            },
        })
        .collect()
}

/// Queued poll as listed by `GET /poll/queue`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueuedPollSummary {
    /// 1-based queue position.
    pub position: usize,
    pub question: String,
    pub options: Vec<String>,
    pub duration_seconds: u64,
}

impl From<(usize, QueuedPoll)> for QueuedPollSummary {
    fn from((index, poll): (usize, QueuedPoll)) -> Self {
        Self {
            position: index + 1,
            question: poll.question,
            options: poll.options.into_iter().map(|option| option.label).collect(),
            duration_seconds: poll.duration_seconds,
        }
    }
}

/// Action tag returned by the sweep trigger.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SweepActionKind {
    EndedActive,
    StartedQueued,
    Cleared,
    None,
}

impl From<SweepAction> for SweepActionKind {
    fn from(value: SweepAction) -> Self {
        match value {
            SweepAction::EndedActive => SweepActionKind::EndedActive,
            SweepAction::StartedQueued => SweepActionKind::StartedQueued,
            SweepAction::Cleared => SweepActionKind::Cleared,
            SweepAction::None => SweepActionKind::None,
        }
    }
}

/// Response of `POST /poll/sweep`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SweepResponse {
    pub action: SweepActionKind,
}

/// Response of `POST /poll/check`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckResponse {
    /// Whether this call ended the poll.
    pub acted: bool,
}

/// Response of `POST /admin/poll/clear`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClearResponse {
    /// Queued polls dropped along with the current one.
    pub discarded_queued: usize,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{services::tally::compute_poll_result, state::poll::ActivePoll};

    fn voted_poll(started_at: SystemTime) -> ActivePoll {
        let mut poll = ActivePoll::from_queued(
            QueuedPoll::new("Q?", vec!["A".into(), "B".into(), "C".into()], 60),
            started_at,
        );
        poll.options[0].add_vote("alice");
        poll.options[1].add_vote("bob");
        poll.options[1].add_vote("carol");
        poll
    }

    #[test]
    fn empty_snapshot_serializes_minimal_fields() {
        let snapshot = PollSnapshot::from_state(&PollState::Empty, 2, SystemTime::UNIX_EPOCH);
        let value = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(value["status"], "empty");
        assert_eq!(value["queue_length"], 2);
        assert!(value.get("question").is_none());
        assert!(value.get("winner_text").is_none());
    }

    #[test]
    fn active_snapshot_reports_remaining_time_and_shares() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let state = PollState::Active(voted_poll(start));
        let snapshot = PollSnapshot::from_state(&state, 0, start + Duration::from_secs(20));

        assert_eq!(snapshot.status, PollStatus::Active);
        assert_eq!(snapshot.remaining_seconds, Some(40));
        assert_eq!(snapshot.total_votes, 3);
        let shares: Vec<u32> = snapshot.options.iter().map(|o| o.percentage).collect();
        assert_eq!(shares, vec![33, 66, 0]);
        assert!(snapshot.winner_text.is_none());
    }

    #[test]
    fn winner_snapshot_carries_overlay_text() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let poll = voted_poll(start);
        let result = compute_poll_result(&poll.question, &poll.options);
        let state = PollState::Winner(poll.into_winner(result, start + Duration::from_secs(70)));

        let snapshot = PollSnapshot::from_state(&state, 0, start + Duration::from_secs(61));

        assert_eq!(snapshot.status, PollStatus::Winner);
        assert_eq!(snapshot.winner_text.as_deref(), Some("B wins (2)"));
        assert!(snapshot.remaining_seconds.is_none());
        assert_eq!(
            snapshot.display_until.as_deref(),
            Some("1970-01-01T00:17:50Z")
        );
    }

    #[test]
    fn sweep_actions_use_snake_case_tags() {
        let value = serde_json::to_value(SweepResponse {
            action: SweepAction::StartedQueued.into(),
        })
        .unwrap();
        assert_eq!(value["action"], "started_queued");
    }
}
