use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        poll::PollSnapshot,
        sse::{PollUpdatedEvent, ServerEvent, SystemStatus},
    },
    state::SharedState,
};

const EVENT_POLL_UPDATED: &str = "poll.updated";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Broadcast the latest poll snapshot to overlay subscribers.
pub fn broadcast_poll_updated(state: &SharedState, snapshot: PollSnapshot) {
    let payload = PollUpdatedEvent(snapshot);
    send_public_event(state, EVENT_POLL_UPDATED, &payload);
}

/// Broadcast a degraded mode change.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_public_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use super::*;
    use crate::{
        config::AppConfig,
        services::announcer::LogAnnouncer,
        state::{AppState, poll::PollState},
    };

    #[tokio::test]
    async fn poll_updates_are_named_and_flattened() {
        let state = AppState::new(AppConfig::default(), Arc::new(LogAnnouncer));
        let mut receiver = state.public_sse().subscribe();

        broadcast_poll_updated(
            &state,
            PollSnapshot::from_state(&PollState::Empty, 1, SystemTime::now()),
        );

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("poll.updated"));
        let data: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(data["status"], "empty");
        assert_eq!(data["queue_length"], 1);
    }
}
