use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::state::poll::PollSettings;

/// Poll settings as exchanged with the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate, PartialEq, Eq)]
pub struct PollSettingsPayload {
    #[validate(range(min = 5, max = 3600))]
    pub duration_seconds: u64,
    pub everyone_can_start: bool,
    pub mods_can_start: bool,
    pub vips_can_start: bool,
    pub ogs_can_start: bool,
    pub subs_can_start: bool,
    #[validate(range(max = 50))]
    pub max_queued_polls: usize,
    #[validate(range(min = 1, max = 600))]
    pub winner_display_seconds: u64,
    pub one_vote_per_person: bool,
}

impl From<PollSettings> for PollSettingsPayload {
    fn from(value: PollSettings) -> Self {
        Self {
            duration_seconds: value.duration_seconds,
            everyone_can_start: value.everyone_can_start,
            mods_can_start: value.mods_can_start,
            vips_can_start: value.vips_can_start,
            ogs_can_start: value.ogs_can_start,
            subs_can_start: value.subs_can_start,
            max_queued_polls: value.max_queued_polls,
            winner_display_seconds: value.winner_display_seconds,
            one_vote_per_person: value.one_vote_per_person,
        }
    }
}

impl From<PollSettingsPayload> for PollSettings {
    fn from(value: PollSettingsPayload) -> Self {
        Self {
            duration_seconds: value.duration_seconds,
            everyone_can_start: value.everyone_can_start,
            mods_can_start: value.mods_can_start,
            vips_can_start: value.vips_can_start,
            ogs_can_start: value.ogs_can_start,
            subs_can_start: value.subs_can_start,
            max_queued_polls: value.max_queued_polls,
            winner_display_seconds: value.winner_display_seconds,
            one_vote_per_person: value.one_vote_per_person,
        }
    }
}
