use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::{
    dto::poll::{CheckResponse, PollSnapshot, QueuedPollSummary, SweepResponse},
    error::AppError,
    services::poll_service,
    state::SharedState,
};

/// Poll read endpoints and lifecycle triggers.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/poll", get(get_poll))
        .route("/poll/queue", get(get_queue))
        .route("/poll/sweep", post(sweep))
        .route("/poll/check", post(check))
}

#[utoipa::path(
    get,
    path = "/poll",
    tag = "poll",
    responses((status = 200, description = "Current poll", body = PollSnapshot))
)]
/// Current poll snapshot for the overlay.
pub async fn get_poll(State(state): State<SharedState>) -> Result<Json<PollSnapshot>, AppError> {
    Ok(Json(poll_service::snapshot(&state).await?))
}

#[utoipa::path(
    get,
    path = "/poll/queue",
    tag = "poll",
    responses((status = 200, description = "Queued polls, oldest first", body = [QueuedPollSummary]))
)]
/// Polls waiting for the current one to finish.
pub async fn get_queue(
    State(state): State<SharedState>,
) -> Result<Json<Vec<QueuedPollSummary>>, AppError> {
    Ok(Json(poll_service::queue(&state).await?))
}

#[utoipa::path(
    post,
    path = "/poll/sweep",
    tag = "poll",
    responses((status = 200, description = "Sweep performed", body = SweepResponse))
)]
/// Periodic sweep trigger for external schedulers.
pub async fn sweep(State(state): State<SharedState>) -> Result<Json<SweepResponse>, AppError> {
    Ok(Json(poll_service::sweep(&state).await?))
}

#[utoipa::path(
    post,
    path = "/poll/check",
    tag = "poll",
    responses((status = 200, description = "Overdue check performed", body = CheckResponse))
)]
/// Overlay "check now" ping.
pub async fn check(State(state): State<SharedState>) -> Result<Json<CheckResponse>, AppError> {
    Ok(Json(poll_service::check(&state).await?))
}
