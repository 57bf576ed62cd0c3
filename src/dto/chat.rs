use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::validation::validate_username,
    services::chat_service::ChatOutcome,
    state::poll::ChatRoles,
};

/// Chat message forwarded by the webhook layer, with roles already resolved.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChatMessageRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(length(min = 1, max = 500))]
    pub text: String,
    #[serde(default)]
    pub roles: ChatRoles,
}

/// What the message did to the poll.
#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChatMessageResponse {
    PollStarted { poll_id: Uuid },
    PollQueued { position: usize },
    QueueFull,
    PermissionDenied,
    ContentBlocked,
    VoteCounted { option: String, votes: u32 },
    VoteIgnored,
    PollEnded,
    Ignored,
}

impl From<ChatOutcome> for ChatMessageResponse {
    fn from(value: ChatOutcome) -> Self {
        match value {
            ChatOutcome::PollStarted { poll_id } => Self::PollStarted { poll_id },
            ChatOutcome::PollQueued { position } => Self::PollQueued { position },
            ChatOutcome::QueueFull => Self::QueueFull,
            ChatOutcome::PermissionDenied => Self::PermissionDenied,
            ChatOutcome::ContentBlocked => Self::ContentBlocked,
            ChatOutcome::VoteCounted { option, votes } => Self::VoteCounted { option, votes },
            ChatOutcome::VoteIgnored => Self::VoteIgnored,
            ChatOutcome::PollEnded => Self::PollEnded,
            ChatOutcome::Ignored => Self::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_default_to_none() {
        let request: ChatMessageRequest =
            serde_json::from_str(r#"{ "username": "viewer", "text": "!yes" }"#).unwrap();
        assert_eq!(request.roles, ChatRoles::default());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn blank_text_and_usernames_are_rejected() {
        let request: ChatMessageRequest =
            serde_json::from_str(r#"{ "username": "two words", "text": "" }"#).unwrap();
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("text"));
    }

    #[test]
    fn response_is_tagged_by_outcome() {
        let value = serde_json::to_value(ChatMessageResponse::from(ChatOutcome::VoteCounted {
            option: "Tacos".into(),
            votes: 2,
        }))
        .unwrap();
        assert_eq!(value["outcome"], "vote_counted");
        assert_eq!(value["option"], "Tacos");
        assert_eq!(value["votes"], 2);
    }
}
