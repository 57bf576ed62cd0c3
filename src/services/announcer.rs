//! Outbound chat announcements.
//!
//! Delivery is best effort: callers log failures and carry on with their state transition.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ChatConfig;

/// Failures that can occur while talking to the chat platform.
#[derive(Debug, Error)]
pub enum AnnounceError {
    /// The chat platform could not be reached.
    #[error("failed to reach chat platform at `{url}`")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The chat platform answered with an unexpected status.
    #[error("chat platform returned status {status} for `{url}`")]
    Status { url: String, status: StatusCode },
    /// The access token expired and could not be refreshed.
    #[error("chat token refresh failed: {0}")]
    TokenRefresh(String),
}

/// Sends messages to the stream chat.
pub trait ChatAnnouncer: Send + Sync {
    /// Whether the stream is currently live.
    fn is_live(&self) -> BoxFuture<'static, Result<bool, AnnounceError>>;
    /// Post `text` to chat, returning the platform's message id when it reports one.
    fn send_message(&self, text: String) -> BoxFuture<'static, Result<Option<String>, AnnounceError>>;
}

/// Announcer used when no chat integration is configured: messages only reach the logs.
#[derive(Debug, Clone, Default)]
pub struct LogAnnouncer;

impl ChatAnnouncer for LogAnnouncer {
    fn is_live(&self) -> BoxFuture<'static, Result<bool, AnnounceError>> {
        Box::pin(async { Ok(true) })
    }

    fn send_message(&self, text: String) -> BoxFuture<'static, Result<Option<String>, AnnounceError>> {
        Box::pin(async move {
            info!(message = %text, "chat announcement (no chat integration configured)");
            Ok(None)
        })
    }
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct SentMessage {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct RefreshedToken {
    access_token: String,
}

#[derive(Deserialize)]
struct StreamStatus {
    live: bool,
}

/// Announcer posting JSON messages to a chat bot webhook with a bearer token.
#[derive(Clone)]
pub struct WebhookAnnouncer {
    client: Client,
    config: Arc<ChatConfig>,
    token: Arc<RwLock<String>>,
}

impl WebhookAnnouncer {
    /// Build the HTTP client for `config`.
    pub fn new(config: ChatConfig) -> Result<Self, AnnounceError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .map_err(|source| AnnounceError::Request {
                url: config.endpoint.clone(),
                source,
            })?;
        let token = Arc::new(RwLock::new(config.token.clone()));
        Ok(Self {
            client,
            config: Arc::new(config),
            token,
        })
    }

    async fn post_message(&self, text: &str) -> Result<reqwest::Response, AnnounceError> {
        let token = self.token.read().await.clone();
        self.client
            .post(&self.config.endpoint)
            .bearer_auth(token)
            .json(&OutboundMessage { message: text })
            .send()
            .await
            .map_err(|source| AnnounceError::Request {
                url: self.config.endpoint.clone(),
                source,
            })
    }

    async fn refresh_token(&self) -> Result<(), AnnounceError> {
        let Some(url) = self.config.refresh_url.as_deref() else {
            return Err(AnnounceError::TokenRefresh(
                "no refresh endpoint configured".into(),
            ));
        };

        let current = self.token.read().await.clone();
        let response = self
            .client
            .post(url)
            .bearer_auth(current)
            .send()
            .await
            .map_err(|err| AnnounceError::TokenRefresh(err.to_string()))?;
        if !response.status().is_success() {
            return Err(AnnounceError::TokenRefresh(format!(
                "refresh endpoint returned {}",
                response.status()
            )));
        }

        let refreshed = response
            .json::<RefreshedToken>()
            .await
            .map_err(|err| AnnounceError::TokenRefresh(err.to_string()))?;
        *self.token.write().await = refreshed.access_token;
        debug!("chat token refreshed");
        Ok(())
    }

    async fn deliver(&self, text: &str) -> Result<Option<String>, AnnounceError> {
        let mut response = self.post_message(text).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.refresh_token().await?;
            response = self.post_message(text).await?;
        }

        if !response.status().is_success() {
            return Err(AnnounceError::Status {
                url: self.config.endpoint.clone(),
                status: response.status(),
            });
        }

        Ok(response
            .json::<SentMessage>()
            .await
            .ok()
            .and_then(|sent| sent.id))
    }

    async fn fetch_live(&self) -> Result<bool, AnnounceError> {
        let Some(url) = self.config.status_url.as_deref() else {
            return Ok(true);
        };

        let token = self.token.read().await.clone();
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| AnnounceError::Request {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(AnnounceError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<StreamStatus>()
            .await
            .map(|status| status.live)
            .map_err(|source| AnnounceError::Request {
                url: url.to_string(),
                source,
            })
    }
}

impl ChatAnnouncer for WebhookAnnouncer {
    fn is_live(&self) -> BoxFuture<'static, Result<bool, AnnounceError>> {
        let announcer = self.clone();
        Box::pin(async move { announcer.fetch_live().await })
    }

    fn send_message(&self, text: String) -> BoxFuture<'static, Result<Option<String>, AnnounceError>> {
        let announcer = self.clone();
        Box::pin(async move { announcer.deliver(&text).await })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    };

    use futures::future::BoxFuture;

    use super::{AnnounceError, ChatAnnouncer};

    /// Announcer that records every message instead of sending it.
    #[derive(Clone, Default)]
    pub struct RecordingAnnouncer {
        messages: Arc<Mutex<Vec<String>>>,
        offline: Arc<AtomicBool>,
        failing: Arc<AtomicBool>,
    }

    impl RecordingAnnouncer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl ChatAnnouncer for RecordingAnnouncer {
        fn is_live(&self) -> BoxFuture<'static, Result<bool, AnnounceError>> {
            let offline = self.offline.load(Ordering::SeqCst);
            Box::pin(async move { Ok(!offline) })
        }

        fn send_message(
            &self,
            text: String,
        ) -> BoxFuture<'static, Result<Option<String>, AnnounceError>> {
            let failing = self.failing.load(Ordering::SeqCst);
            let messages = self.messages.clone();
            Box::pin(async move {
                if failing {
                    return Err(AnnounceError::TokenRefresh("token expired".into()));
                }
                let mut guard = messages.lock().unwrap();
                guard.push(text);
                Ok(Some(format!("msg-{}", guard.len())))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode as HttpStatus, header::AUTHORIZATION},
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use super::*;

    /// Chat bot stub accepting only the refreshed token.
    async fn spawn_chat_stub() -> String {
        async fn say(headers: HeaderMap) -> (HttpStatus, Json<Value>) {
            let authorized = headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                == Some("Bearer fresh");
            if authorized {
                (HttpStatus::OK, Json(json!({ "id": "m-1" })))
            } else {
                (HttpStatus::UNAUTHORIZED, Json(json!({})))
            }
        }

        let app = Router::new()
            .route("/say", post(say))
            .route(
                "/refresh",
                post(|| async { Json(json!({ "access_token": "fresh" })) }),
            )
            .route("/status", get(|| async { Json(json!({ "live": false })) }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config(base: &str, refresh: bool) -> ChatConfig {
        ChatConfig {
            endpoint: format!("{base}/say"),
            token: "stale".into(),
            refresh_url: refresh.then(|| format!("{base}/refresh")),
            status_url: Some(format!("{base}/status")),
        }
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once() {
        let base = spawn_chat_stub().await;
        let announcer = WebhookAnnouncer::new(config(&base, true)).unwrap();

        let id = announcer.send_message("hello".into()).await.unwrap();

        assert_eq!(id.as_deref(), Some("m-1"));
        assert!(!announcer.is_live().await.unwrap());
    }

    #[tokio::test]
    async fn missing_refresh_endpoint_surfaces_token_error() {
        let base = spawn_chat_stub().await;
        let announcer = WebhookAnnouncer::new(config(&base, false)).unwrap();

        let err = announcer.send_message("hello".into()).await.unwrap_err();
        assert!(matches!(err, AnnounceError::TokenRefresh(_)));
    }

    #[tokio::test]
    async fn unset_status_url_means_live() {
        let announcer = WebhookAnnouncer::new(ChatConfig {
            endpoint: "http://127.0.0.1:9/say".into(),
            token: "t".into(),
            refresh_url: None,
            status_url: None,
        })
        .unwrap();
        assert!(announcer.is_live().await.unwrap());
        assert!(LogAnnouncer.is_live().await.unwrap());
        assert_eq!(LogAnnouncer.send_message("x".into()).await.unwrap(), None);
    }
}
