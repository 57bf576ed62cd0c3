use tracing::info;

use crate::{dto::settings::PollSettingsPayload, error::ServiceError, state::SharedState};

/// Settings currently in force.
pub async fn get_settings(state: &SharedState) -> Result<PollSettingsPayload, ServiceError> {
    let lifecycle = state.lifecycle().await?;
    Ok(lifecycle.settings().await?.into())
}

/// Replace the stored settings. They apply from the next start request or vote.
pub async fn update_settings(
    state: &SharedState,
    payload: PollSettingsPayload,
) -> Result<PollSettingsPayload, ServiceError> {
    let store = state.require_poll_store().await?;
    store.save_settings(payload.clone().into()).await?;
    info!(
        duration_seconds = payload.duration_seconds,
        max_queued_polls = payload.max_queued_polls,
        one_vote_per_person = payload.one_vote_per_person,
        "poll settings updated"
    );
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::poll_store::memory::MemoryPollStore,
        services::announcer::LogAnnouncer,
        state::{AppState, poll::PollSettings},
    };

    #[tokio::test]
    async fn updates_are_read_back() {
        let state = AppState::new(AppConfig::default(), Arc::new(LogAnnouncer));
        state.set_poll_store(Arc::new(MemoryPollStore::new())).await;

        let initial = get_settings(&state).await.unwrap();
        assert_eq!(initial, PollSettingsPayload::from(PollSettings::default()));

        let updated = PollSettingsPayload {
            everyone_can_start: true,
            ..initial
        };
        update_settings(&state, updated.clone()).await.unwrap();
        assert_eq!(get_settings(&state).await.unwrap(), updated);
    }
}
