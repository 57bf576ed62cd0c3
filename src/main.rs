//! Overlay polls backend entrypoint wiring chat ingestion, poll triggers, SSE and storage.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use overlay_polls_back::{
    config::AppConfig,
    dao::poll_store::memory::MemoryPollStore,
    routes,
    services::{
        announcer::{ChatAnnouncer, LogAnnouncer, WebhookAnnouncer},
        poll_service,
    },
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let announcer = build_announcer(&config);
    let app_state = AppState::new(config, announcer);

    install_storage(&app_state).await;
    tokio::spawn(poll_service::run_periodic_sweep(app_state.clone()));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Post to the configured chat webhook, or only log announcements when none is set.
fn build_announcer(config: &AppConfig) -> Arc<dyn ChatAnnouncer> {
    let Some(chat) = config.chat.clone() else {
        info!("no chat integration configured; announcements go to the log");
        return Arc::new(LogAnnouncer);
    };

    match WebhookAnnouncer::new(chat) {
        Ok(announcer) => Arc::new(announcer),
        Err(err) => {
            warn!(error = %err, "failed to build chat client; announcements go to the log");
            Arc::new(LogAnnouncer)
        }
    }
}

/// Use CouchDB when it is configured, otherwise keep polls in process memory.
async fn install_storage(state: &SharedState) {
    #[cfg(feature = "couch-store")]
    {
        use overlay_polls_back::{
            dao::{
                poll_store::{
                    PollStore,
                    couchdb::{CouchConfig, CouchPollStore},
                },
                storage::StorageError,
            },
            services::storage_supervisor,
        };

        match CouchConfig::from_env() {
            Ok(couch_config) => {
                info!(
                    base_url = %couch_config.base_url,
                    database = %couch_config.database,
                    "using CouchDB poll store"
                );
                tokio::spawn(storage_supervisor::run(state.clone(), move || {
                    let couch_config = couch_config.clone();
                    async move {
                        let store = CouchPollStore::connect(couch_config)
                            .await
                            .map_err(StorageError::from)?;
                        Ok(Arc::new(store) as Arc<dyn PollStore>)
                    }
                }));
                return;
            }
            Err(err) => info!(reason = %err, "CouchDB not configured"),
        }
    }

    info!("using in-memory poll store");
    state.set_poll_store(Arc::new(MemoryPollStore::new())).await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
