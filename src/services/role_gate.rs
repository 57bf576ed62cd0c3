use crate::state::poll::{ChatRoles, PollSettings};

/// Decide whether `sender` may start a poll under the current settings.
pub fn can_start_poll(
    sender: &str,
    broadcaster: &str,
    settings: &PollSettings,
    roles: &ChatRoles,
) -> bool {
    if roles.broadcaster || (!broadcaster.is_empty() && sender.eq_ignore_ascii_case(broadcaster)) {
        return true;
    }

    settings.everyone_can_start
        || (settings.mods_can_start && roles.moderator)
        || (settings.vips_can_start && roles.vip)
        || (settings.ogs_can_start && roles.og)
        || (settings.subs_can_start && roles.subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked_down() -> PollSettings {
        PollSettings {
            everyone_can_start: false,
            mods_can_start: false,
            vips_can_start: false,
            ogs_can_start: false,
            subs_can_start: false,
            ..PollSettings::default()
        }
    }

    #[test]
    fn broadcaster_always_allowed() {
        let settings = locked_down();
        assert!(can_start_poll("Streamer", "streamer", &settings, &ChatRoles::default()));
        assert!(can_start_poll(
            "someone",
            "streamer",
            &settings,
            &ChatRoles {
                broadcaster: true,
                ..ChatRoles::default()
            }
        ));
    }

    #[test]
    fn everyone_toggle_opens_the_gate() {
        let settings = PollSettings {
            everyone_can_start: true,
            ..locked_down()
        };
        assert!(can_start_poll("viewer", "streamer", &settings, &ChatRoles::default()));
    }

    #[test]
    fn role_toggles_need_matching_flags() {
        let settings = PollSettings {
            vips_can_start: true,
            ..locked_down()
        };
        let vip = ChatRoles {
            vip: true,
            ..ChatRoles::default()
        };
        let moderator = ChatRoles {
            moderator: true,
            ..ChatRoles::default()
        };

        assert!(can_start_poll("v", "streamer", &settings, &vip));
        assert!(!can_start_poll("m", "streamer", &settings, &moderator));
    }

    #[test]
    fn every_role_toggle_is_honoured() {
        let cases = [
            (
                PollSettings {
                    mods_can_start: true,
                    ..locked_down()
                },
                ChatRoles {
                    moderator: true,
                    ..ChatRoles::default()
                },
            ),
            (
                PollSettings {
                    ogs_can_start: true,
                    ..locked_down()
                },
                ChatRoles {
                    og: true,
                    ..ChatRoles::default()
                },
            ),
            (
                PollSettings {
                    subs_can_start: true,
                    ..locked_down()
                },
                ChatRoles {
                    subscriber: true,
                    ..ChatRoles::default()
                },
            ),
        ];

        for (settings, roles) in cases {
            assert!(can_start_poll("user", "streamer", &settings, &roles));
            assert!(!can_start_poll("user", "streamer", &locked_down(), &roles));
        }
    }

    #[test]
    fn empty_broadcaster_name_matches_nobody() {
        assert!(!can_start_poll("", "", &locked_down(), &ChatRoles::default()));
    }
}
