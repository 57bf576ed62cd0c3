/// Outbound chat announcements.
pub mod announcer;
/// Chat message ingestion.
pub mod chat_service;
/// Chat command and vote parsing.
pub mod command_parser;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Poll lifecycle state machine driver.
pub mod lifecycle;
/// Poll snapshots and lifecycle triggers.
pub mod poll_service;
/// Poll start permissions.
pub mod role_gate;
/// Admin-editable poll settings.
pub mod settings_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor with backoff.
pub mod storage_supervisor;
/// Vote tallying and winner messages.
pub mod tally;
