use std::time::SystemTime;

use tracing::debug;
use uuid::Uuid;

use crate::{
    dto::chat::{ChatMessageRequest, ChatMessageResponse},
    error::ServiceError,
    services::{
        command_parser::{parse_poll_command, parse_vote, poll_contains_blocked_content},
        lifecycle::{PollLifecycle, StartOutcome, VoteResult},
        poll_service,
        role_gate::can_start_poll,
    },
    state::{
        SharedState,
        poll::{ChatRoles, PollState},
    },
};

/// What a single chat message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// A new poll is active.
    PollStarted { poll_id: Uuid },
    /// The poll waits in the queue at `position` (1-based).
    PollQueued { position: usize },
    /// The poll had to wait but the queue is full.
    QueueFull,
    /// The sender may not start polls.
    PermissionDenied,
    /// The question or an option contains a blocked word.
    ContentBlocked,
    /// The vote was counted; `votes` is the option's new total.
    VoteCounted { option: String, votes: u32 },
    /// The message parsed as a vote but was not counted.
    VoteIgnored,
    /// Nothing matched, but the message triggered the end of an overdue poll.
    PollEnded,
    /// Neither a command nor a vote.
    Ignored,
}

impl ChatOutcome {
    /// Whether the poll record or queue changed.
    pub fn changed_state(&self) -> bool {
        matches!(
            self,
            ChatOutcome::PollStarted { .. }
                | ChatOutcome::PollQueued { .. }
                | ChatOutcome::VoteCounted { .. }
                | ChatOutcome::PollEnded
        )
    }
}

/// Identity and text of one inbound chat message.
#[derive(Debug, Clone, Copy)]
pub struct IncomingChat<'a> {
    /// Chat login of the sender.
    pub username: &'a str,
    /// Raw message text.
    pub text: &'a str,
    /// Badges of the sender.
    pub roles: ChatRoles,
}

/// Route one chat message to the start path or the vote path.
///
/// Every message doubles as an expiry trigger: an overdue poll is ended before the
/// message itself is interpreted.
pub async fn ingest(
    lifecycle: &PollLifecycle,
    broadcaster: &str,
    blocked_words: &[String],
    message: IncomingChat<'_>,
    now: SystemTime,
) -> Result<ChatOutcome, ServiceError> {
    let mut current = lifecycle.current().await?;
    let mut ended = false;
    if let PollState::Active(poll) = &current {
        if poll.is_overdue(now) {
            ended = lifecycle.finish_overdue(poll.clone(), now).await?.acted();
            current = lifecycle.current().await?;
        }
    }

    let outcome = if let Some(request) = parse_poll_command(message.text) {
        let settings = lifecycle.settings().await?;
        if !can_start_poll(message.username, broadcaster, &settings, &message.roles) {
            debug!(user = %message.username, "poll start denied");
            ChatOutcome::PermissionDenied
        } else if poll_contains_blocked_content(&request.question, &request.options, blocked_words)
        {
            debug!(user = %message.username, "poll start blocked by content filter");
            ChatOutcome::ContentBlocked
        } else {
            match lifecycle.start_or_enqueue(request, &settings, now).await? {
                StartOutcome::Started { poll_id } => ChatOutcome::PollStarted { poll_id },
                StartOutcome::Queued { position } => ChatOutcome::PollQueued { position },
                StartOutcome::QueueFull => ChatOutcome::QueueFull,
            }
        }
    } else {
        match current {
            PollState::Active(poll) if !poll.is_overdue(now) => {
                match parse_vote(message.text, &poll.options, message.username) {
                    Some(vote) => {
                        let settings = lifecycle.settings().await?;
                        match lifecycle
                            .cast_vote(&poll, vote, settings.one_vote_per_person)
                            .await?
                        {
                            VoteResult::Counted { option, votes } => {
                                ChatOutcome::VoteCounted { option, votes }
                            }
                            VoteResult::AlreadyVoted | VoteResult::NoActivePoll => {
                                ChatOutcome::VoteIgnored
                            }
                        }
                    }
                    None => ChatOutcome::Ignored,
                }
            }
            _ => ChatOutcome::Ignored,
        }
    };

    Ok(match outcome {
        ChatOutcome::Ignored | ChatOutcome::VoteIgnored if ended => ChatOutcome::PollEnded,
        other => other,
    })
}

/// Handle a chat message delivered over HTTP and push the new snapshot to the overlay.
pub async fn handle_chat_message(
    state: &SharedState,
    request: ChatMessageRequest,
) -> Result<ChatMessageResponse, ServiceError> {
    let lifecycle = state.lifecycle().await?;
    let config = state.config();
    let outcome = ingest(
        &lifecycle,
        &config.broadcaster,
        &config.blocked_words,
        IncomingChat {
            username: request.username.trim(),
            text: &request.text,
            roles: request.roles,
        },
        SystemTime::now(),
    )
    .await?;

    if outcome.changed_state() {
        poll_service::publish_snapshot(state, &lifecycle).await;
    }

    Ok(outcome.into())
}
