use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the overlay polls backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::chat::post_chat_message,
        crate::routes::poll::get_poll,
        crate::routes::poll::get_queue,
        crate::routes::poll::sweep,
        crate::routes::poll::check,
        crate::routes::admin::get_settings,
        crate::routes::admin::update_settings,
        crate::routes::admin::clear_poll,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::chat::ChatMessageRequest,
            crate::dto::chat::ChatMessageResponse,
            crate::dto::poll::PollSnapshot,
            crate::dto::poll::QueuedPollSummary,
            crate::dto::poll::SweepResponse,
            crate::dto::poll::CheckResponse,
            crate::dto::poll::ClearResponse,
            crate::dto::settings::PollSettingsPayload,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "chat", description = "Chat ingestion"),
        (name = "poll", description = "Poll state and lifecycle triggers"),
        (name = "admin", description = "Poll administration"),
    )
)]
/// OpenAPI description of every HTTP route.
pub struct ApiDoc;
