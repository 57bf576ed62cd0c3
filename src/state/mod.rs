pub mod poll;
mod sse;
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::poll_store::PollStore,
    error::ServiceError,
    services::{announcer::ChatAnnouncer, lifecycle::PollLifecycle},
};

pub use self::sse::SseHub;

/// Handle cloned into every request handler and background task.
pub type SharedState = Arc<AppState>;

const PUBLIC_SSE_CAPACITY: usize = 32;

/// Process-wide handles: configuration, the shared poll store and outbound channels.
///
/// Nothing about the poll itself lives here; every request reloads it from the store.
pub struct AppState {
    config: AppConfig,
    poll_store: RwLock<Option<Arc<dyn PollStore>>>,
    announcer: Arc<dyn ChatAnnouncer>,
    sse: SseHub,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, announcer: Arc<dyn ChatAnnouncer>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            poll_store: RwLock::new(None),
            announcer,
            sse: SseHub::new(PUBLIC_SSE_CAPACITY),
            degraded: degraded_tx,
        })
    }

    /// Runtime configuration loaded at startup.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current poll store, if one is installed.
    pub async fn poll_store(&self) -> Option<Arc<dyn PollStore>> {
        let guard = self.poll_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current poll store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_poll_store(&self) -> Result<Arc<dyn PollStore>, ServiceError> {
        self.poll_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new poll store implementation and leave degraded mode.
    pub async fn set_poll_store(&self, store: Arc<dyn PollStore>) {
        {
            let mut guard = self.poll_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current poll store and enter degraded mode.
    pub async fn clear_poll_store(&self) {
        {
            let mut guard = self.poll_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.poll_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.sse
    }

    /// Chat integration used for poll announcements.
    pub fn announcer(&self) -> Arc<dyn ChatAnnouncer> {
        self.announcer.clone()
    }

    /// Lifecycle manager bound to the installed store.
    pub async fn lifecycle(&self) -> Result<PollLifecycle, ServiceError> {
        let store = self.require_poll_store().await?;
        Ok(PollLifecycle::new(
            store,
            self.announcer.clone(),
            self.config.lock_ttl,
            self.config.poll_defaults.clone(),
        ))
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub(crate) fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
