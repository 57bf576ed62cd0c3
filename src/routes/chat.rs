use axum::{Json, Router, extract::State, routing::post};
use axum_valid::Valid;

use crate::{
    dto::chat::{ChatMessageRequest, ChatMessageResponse},
    error::AppError,
    services::chat_service,
    state::SharedState,
};

/// Chat ingestion endpoint fed by the webhook layer.
pub fn router() -> Router<SharedState> {
    Router::new().route("/chat/messages", post(post_chat_message))
}

/// Interpret one chat message as a poll command, a vote, or nothing.
#[utoipa::path(
    post,
    path = "/chat/messages",
    tag = "chat",
    request_body = ChatMessageRequest,
    responses(
        (status = 200, description = "Message processed", body = ChatMessageResponse),
        (status = 503, description = "Poll store unavailable")
    )
)]
pub async fn post_chat_message(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<ChatMessageRequest>>,
) -> Result<Json<ChatMessageResponse>, AppError> {
    let response = chat_service::handle_chat_message(&state, payload).await?;
    Ok(Json(response))
}
