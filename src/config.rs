//! Application-level configuration loading, including poll defaults and chat integration.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use crate::{dto::settings::PollSettingsPayload, state::poll::PollSettings};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "OVERLAY_POLLS_CONFIG_PATH";
const DEFAULT_LOCK_TTL_SECONDS: u64 = 5;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 5;
const MAX_LOCK_TTL_SECONDS: u64 = 300;
const MAX_SWEEP_INTERVAL_SECONDS: u64 = 3_600;

/// Outbound chat webhook used for poll announcements.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// URL receiving `{"message": ...}` posts.
    pub endpoint: String,
    /// Bearer token sent with every request.
    pub token: String,
    /// Endpoint returning `{"access_token": ...}` when the token expires.
    #[serde(default)]
    pub refresh_url: Option<String>,
    /// Endpoint returning `{"live": bool}`; the stream is assumed live when unset.
    #[serde(default)]
    pub status_url: Option<String>,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Channel owner; always allowed to start polls.
    pub broadcaster: String,
    /// Settings used until an administrator stores their own.
    pub poll_defaults: PollSettings,
    /// Words or phrases that veto poll creation.
    pub blocked_words: Vec<String>,
    /// Lifetime of the ending lock.
    pub lock_ttl: Duration,
    /// Cadence of the periodic sweep.
    pub sweep_interval: Duration,
    /// Token expected in the `X-Admin-Token` header; admin routes are closed without it.
    pub admin_token: Option<String>,
    /// Chat webhook; announcements only reach the log when unset.
    pub chat: Option<ChatConfig>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        blocked_words = app_config.blocked_words.len(),
                        chat = app_config.chat.is_some(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    broadcaster: String,
    poll_defaults: PollSettings,
    blocked_words: Vec<String>,
    lock_ttl_seconds: u64,
    sweep_interval_seconds: u64,
    admin_token: Option<String>,
    chat: Option<ChatConfig>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            broadcaster: String::new(),
            poll_defaults: PollSettings::default(),
            blocked_words: Vec::new(),
            lock_ttl_seconds: DEFAULT_LOCK_TTL_SECONDS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            admin_token: None,
            chat: None,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            broadcaster: value.broadcaster.trim().to_string(),
            poll_defaults: checked_poll_defaults(value.poll_defaults),
            blocked_words: value.blocked_words,
            lock_ttl: Duration::from_secs(value.lock_ttl_seconds.clamp(1, MAX_LOCK_TTL_SECONDS)),
            sweep_interval: Duration::from_secs(
                value
                    .sweep_interval_seconds
                    .clamp(1, MAX_SWEEP_INTERVAL_SECONDS),
            ),
            admin_token: value.admin_token.filter(|token| !token.is_empty()),
            chat: value.chat,
        }
    }
}

/// Keep configured defaults only when they pass the same checks as the admin surface.
fn checked_poll_defaults(settings: PollSettings) -> PollSettings {
    match PollSettingsPayload::from(settings.clone()).validate() {
        Ok(()) => settings,
        Err(err) => {
            warn!(error = %err, "invalid poll_defaults in configuration; using built-in defaults");
            PollSettings::default()
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
