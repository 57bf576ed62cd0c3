use std::time::SystemTime;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    dto::poll::{
        CheckResponse, ClearResponse, PollSnapshot, QueuedPollSummary, SweepActionKind,
        SweepResponse,
    },
    error::ServiceError,
    services::{
        lifecycle::{PollLifecycle, SweepAction},
        sse_events,
    },
    state::SharedState,
};

/// Current poll as rendered for the overlay.
pub async fn snapshot(state: &SharedState) -> Result<PollSnapshot, ServiceError> {
    let lifecycle = state.lifecycle().await?;
    build_snapshot(&lifecycle, SystemTime::now()).await
}

/// Queued polls, oldest first.
pub async fn queue(state: &SharedState) -> Result<Vec<QueuedPollSummary>, ServiceError> {
    let lifecycle = state.lifecycle().await?;
    Ok(lifecycle
        .queue()
        .await?
        .into_iter()
        .enumerate()
        .map(QueuedPollSummary::from)
        .collect())
}

/// Run one sweep and push the result to the overlay when something changed.
pub async fn sweep(state: &SharedState) -> Result<SweepResponse, ServiceError> {
    let lifecycle = state.lifecycle().await?;
    let action = lifecycle.sweep(SystemTime::now()).await?;
    if action != SweepAction::None {
        publish_snapshot(state, &lifecycle).await;
    }
    Ok(SweepResponse {
        action: action.into(),
    })
}

/// Overlay "check now" ping: end the poll if it is overdue, nothing else.
pub async fn check(state: &SharedState) -> Result<CheckResponse, ServiceError> {
    let lifecycle = state.lifecycle().await?;
    let outcome = lifecycle.end_if_overdue(SystemTime::now()).await?;
    let acted = outcome.acted();
    if acted {
        publish_snapshot(state, &lifecycle).await;
    }
    Ok(CheckResponse { acted })
}

/// Drop the current poll and the queue.
pub async fn clear(state: &SharedState) -> Result<ClearResponse, ServiceError> {
    let lifecycle = state.lifecycle().await?;
    let discarded_queued = lifecycle.clear().await?;
    publish_snapshot(state, &lifecycle).await;
    Ok(ClearResponse { discarded_queued })
}

/// Broadcast the latest snapshot; failures only cost the overlay one update.
pub async fn publish_snapshot(state: &SharedState, lifecycle: &PollLifecycle) {
    match build_snapshot(lifecycle, SystemTime::now()).await {
        Ok(snapshot) => sse_events::broadcast_poll_updated(state, snapshot),
        Err(err) => warn!(error = %err, "failed to build poll snapshot for SSE"),
    }
}

/// Sweep on the configured cadence until the process exits.
pub async fn run_periodic_sweep(state: SharedState) {
    let mut ticker = interval(state.config().sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval = ?state.config().sweep_interval, "periodic poll sweep started");

    loop {
        ticker.tick().await;
        match sweep(&state).await {
            Ok(SweepResponse {
                action: SweepActionKind::None,
            }) => {}
            Ok(response) => debug!(action = ?response.action, "periodic sweep acted"),
            Err(ServiceError::Degraded) => debug!("periodic sweep skipped (degraded mode)"),
            Err(err) => warn!(error = %err, "periodic sweep failed"),
        }
    }
}

async fn build_snapshot(
    lifecycle: &PollLifecycle,
    now: SystemTime,
) -> Result<PollSnapshot, ServiceError> {
    let current = lifecycle.current().await?;
    let queue_length = lifecycle.queue().await?.len();
    let store = lifecycle.store();
    let updated_at = store.last_modified().await?;
    let last_ended_at = store.last_ended_at().await?;
    Ok(PollSnapshot::from_state(&current, queue_length, now).with_markers(updated_at, last_ended_at))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::poll_store::{PollStore, memory::MemoryPollStore},
        dto::poll::PollStatus,
        services::announcer::LogAnnouncer,
        state::{
            AppState,
            poll::{ActivePoll, PollState, QueuedPoll},
        },
    };

    async fn state_with_store() -> (SharedState, MemoryPollStore) {
        let state = AppState::new(AppConfig::default(), Arc::new(LogAnnouncer));
        let store = MemoryPollStore::new();
        state.set_poll_store(Arc::new(store.clone())).await;
        (state, store)
    }

    #[tokio::test]
    async fn degraded_mode_rejects_triggers() {
        let state = AppState::new(AppConfig::default(), Arc::new(LogAnnouncer));
        assert!(matches!(sweep(&state).await, Err(ServiceError::Degraded)));
        assert!(matches!(check(&state).await, Err(ServiceError::Degraded)));
    }

    #[tokio::test]
    async fn check_ends_an_overdue_poll_and_publishes() {
        let (state, store) = state_with_store().await;
        let started_at = SystemTime::now() - std::time::Duration::from_secs(120);
        store
            .save_poll(PollState::Active(ActivePoll::from_queued(
                QueuedPoll::new("Done?", vec!["Yes".into(), "No".into()], 60),
                started_at,
            )))
            .await
            .unwrap();
        let mut receiver = state.public_sse().subscribe();

        assert!(check(&state).await.unwrap().acted);
        assert!(!check(&state).await.unwrap().acted);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("poll.updated"));
        assert_eq!(snapshot(&state).await.unwrap().status, PollStatus::Winner);
    }

    #[tokio::test]
    async fn sweep_on_empty_store_does_nothing() {
        let (state, _store) = state_with_store().await;
        let response = sweep(&state).await.unwrap();
        assert_eq!(response.action, SweepActionKind::None);
    }

    #[tokio::test]
    async fn queue_lists_positions() {
        let (state, store) = state_with_store().await;
        for question in ["One?", "Two?"] {
            store
                .push_queue(QueuedPoll::new(question, vec!["A".into(), "B".into()], 30), 5)
                .await
                .unwrap();
        }

        let listed = queue(&state).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].position, 1);
        assert_eq!(listed[1].question, "Two?");
        assert_eq!(listed[1].options, vec!["A", "B"]);
    }
}
