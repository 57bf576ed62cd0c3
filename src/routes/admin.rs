use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::{poll::ClearResponse, settings::PollSettingsPayload},
    error::AppError,
    services::{poll_service, settings_service},
    state::SharedState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin-only poll management endpoints.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route(
            "/admin/poll/settings",
            get(get_settings).put(update_settings),
        )
        .route("/admin/poll/clear", post(clear_poll))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Read the poll settings in force.
#[utoipa::path(
    get,
    path = "/admin/poll/settings",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token from the configuration file")),
    responses((status = 200, description = "Current poll settings", body = PollSettingsPayload))
)]
pub async fn get_settings(
    State(state): State<SharedState>,
) -> Result<Json<PollSettingsPayload>, AppError> {
    Ok(Json(settings_service::get_settings(&state).await?))
}

/// Replace the poll settings.
#[utoipa::path(
    put,
    path = "/admin/poll/settings",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token from the configuration file")),
    request_body = PollSettingsPayload,
    responses(
        (status = 200, description = "Settings stored", body = PollSettingsPayload),
        (status = 400, description = "Out-of-range values")
    )
)]
pub async fn update_settings(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<PollSettingsPayload>>,
) -> Result<Json<PollSettingsPayload>, AppError> {
    Ok(Json(
        settings_service::update_settings(&state, payload).await?,
    ))
}

/// Drop the current poll and every queued poll.
#[utoipa::path(
    post,
    path = "/admin/poll/clear",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token from the configuration file")),
    responses((status = 200, description = "Poll cleared", body = ClearResponse))
)]
pub async fn clear_poll(State(state): State<SharedState>) -> Result<Json<ClearResponse>, AppError> {
    Ok(Json(poll_service::clear(&state).await?))
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    match state.config().admin_token.as_deref() {
        Some(token) if token == provided => Ok(next.run(req).await),
        Some(_) => Err(AppError::Unauthorized("invalid admin token".into())),
        None => Err(AppError::Unauthorized(
            "admin token not configured".into(),
        )),
    }
}
