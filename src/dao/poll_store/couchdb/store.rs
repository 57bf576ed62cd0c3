use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    dao::{
        poll_store::{PollStore, QueuePush, VoteOutcome, apply_start_message_id, apply_vote},
        storage::{StorageError, StorageResult},
    },
    state::poll::{PollSettings, PollState, QueuedPoll},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        CouchDocument, ENDED_DOC_ID, LockBody, MarkerBody, POLL_DOC_ID, PollBody, QUEUE_DOC_ID,
        QueueBody, SETTINGS_DOC_ID, SettingsBody, lock_doc_id,
    },
};

const MAX_CAS_ATTEMPTS: u32 = 8;

/// Result of a revision-guarded PUT.
enum PutOutcome {
    Written,
    Conflict,
}

/// What a compare-and-set step decided to do with the current document body.
enum Mutation<T, R> {
    /// Leave the document untouched and return `R`.
    Keep(R),
    /// Write the new body and return `R` once the write sticks.
    Write(T, R),
}

/// Poll store shared by every instance of the service through CouchDB.
///
/// Each logical key lives in its own document; atomic operations are read-modify-write
/// loops guarded by the document revision.
#[derive(Clone)]
pub struct CouchPollStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchPollStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        let builder = self.client.request(method, url);
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn database_request(&self, method: Method) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, self.database);
        let builder = self.client.request(method, url);
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();

        let response = self
            .database_request(Method::GET)
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .database_request(Method::PUT)
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another instance created it first.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<CouchDocument<T>>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<CouchDocument<T>>()
                .await
                .map(Some)
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: doc_id.to_string(),
                    source,
                }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, document: &CouchDocument<T>) -> CouchResult<PutOutcome>
    where
        T: Serialize + Sync,
    {
        let response = self
            .request(Method::PUT, &document.id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: document.id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(PutOutcome::Conflict),
            status if status.is_success() => Ok(PutOutcome::Written),
            other => Err(CouchDaoError::RequestStatus {
                path: document.id.clone(),
                status: other,
            }),
        }
    }

    /// Read-modify-write `doc_id`, retrying whenever another writer bumped the revision.
    async fn update_document<T, R, F>(&self, doc_id: &str, mut mutate: F) -> CouchResult<R>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        R: Send,
        F: FnMut(Option<T>) -> Mutation<T, R> + Send,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let (rev, body) = match self.get_document::<T>(doc_id).await? {
                Some(doc) => (doc.rev, Some(doc.body)),
                None => (None, None),
            };

            match mutate(body) {
                Mutation::Keep(result) => return Ok(result),
                Mutation::Write(next, result) => {
                    let document = CouchDocument::new(doc_id, rev, next);
                    match self.put_document(&document).await? {
                        PutOutcome::Written => return Ok(result),
                        PutOutcome::Conflict => continue,
                    }
                }
            }
        }

        Err(CouchDaoError::ConflictRetriesExhausted {
            path: doc_id.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    async fn load_poll_body(&self) -> CouchResult<Option<PollBody>> {
        Ok(self
            .get_document::<PollBody>(POLL_DOC_ID)
            .await?
            .map(|doc| doc.body))
    }

    /// Mutate the poll record in place; `apply` returns the result and whether to write.
    async fn update_poll<R, F>(&self, mut apply: F) -> CouchResult<R>
    where
        R: Send,
        F: FnMut(&mut PollState) -> (R, bool) + Send,
    {
        self.update_document::<PollBody, R, _>(POLL_DOC_ID, |current| {
            let mut state = current.map(|body| body.state).unwrap_or_default();
            let (result, changed) = apply(&mut state);
            if changed {
                Mutation::Write(
                    PollBody {
                        state,
                        modified_at: SystemTime::now(),
                    },
                    result,
                )
            } else {
                Mutation::Keep(result)
            }
        })
        .await
    }
}

impl PollStore for CouchPollStore {
    fn load_poll(&self) -> BoxFuture<'static, StorageResult<PollState>> {
        let store = self.clone();
        Box::pin(async move {
            let body = store.load_poll_body().await?;
            Ok(body.map(|body| body.state).unwrap_or_default())
        })
    }

    fn save_poll(&self, state: PollState) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_poll(|current| {
                    *current = state.clone();
                    ((), true)
                })
                .await
                .map_err(Into::into)
        })
    }

    fn replace_poll_if(
        &self,
        expected: Option<Uuid>,
        next: PollState,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_poll(|current| {
                    if current.id() != expected {
                        return (false, false);
                    }
                    *current = next.clone();
                    (true, true)
                })
                .await
                .map_err(Into::into)
        })
    }

    fn record_vote(
        &self,
        poll_id: Uuid,
        option_index: usize,
        voter: String,
        one_vote_per_person: bool,
    ) -> BoxFuture<'static, StorageResult<VoteOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_poll(|current| {
                    let outcome =
                        apply_vote(current, poll_id, option_index, &voter, one_vote_per_person);
                    let changed = matches!(outcome, VoteOutcome::Counted { .. });
                    (outcome, changed)
                })
                .await
                .map_err(Into::into)
        })
    }

    fn set_start_message_id(
        &self,
        poll_id: Uuid,
        message_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_poll(|current| {
                    let updated = apply_start_message_id(current, poll_id, message_id.clone());
                    (updated, updated)
                })
                .await
                .map_err(Into::into)
        })
    }

    fn last_modified(&self) -> BoxFuture<'static, StorageResult<Option<SystemTime>>> {
        let store = self.clone();
        Box::pin(async move {
            let body = store.load_poll_body().await?;
            Ok(body.map(|body| body.modified_at))
        })
    }

    fn push_queue(
        &self,
        poll: QueuedPoll,
        max_len: usize,
    ) -> BoxFuture<'static, StorageResult<QueuePush>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_document::<QueueBody, QueuePush, _>(QUEUE_DOC_ID, |current| {
                    let mut queue = current.unwrap_or_default();
                    if queue.items.len() >= max_len {
                        return Mutation::Keep(QueuePush::Full);
                    }
                    queue.items.push(poll.clone());
                    let position = queue.items.len();
                    Mutation::Write(queue, QueuePush::Queued { position })
                })
                .await
                .map_err(Into::into)
        })
    }

    fn pop_queue(&self) -> BoxFuture<'static, StorageResult<Option<QueuedPoll>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_document::<QueueBody, Option<QueuedPoll>, _>(QUEUE_DOC_ID, |current| {
                    let mut queue = current.unwrap_or_default();
                    if queue.items.is_empty() {
                        return Mutation::Keep(None);
                    }
                    let head = queue.items.remove(0);
                    Mutation::Write(queue, Some(head))
                })
                .await
                .map_err(Into::into)
        })
    }

    fn list_queue(&self) -> BoxFuture<'static, StorageResult<Vec<QueuedPoll>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store.get_document::<QueueBody>(QUEUE_DOC_ID).await?;
            Ok(doc.map(|doc| doc.body.items).unwrap_or_default())
        })
    }

    fn try_acquire_lock(
        &self,
        key: String,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = lock_doc_id(&key);
            let now = SystemTime::now();
            let Some(expires_at) = now.checked_add(ttl) else {
                return Err(StorageError::LockTtl { key, ttl });
            };

            // Creating without a revision, or replacing an expired lock with its revision,
            // both fail with 409 if another instance got there first.
            let rev = match store.get_document::<LockBody>(&doc_id).await? {
                Some(doc) if doc.body.expires_at > now => return Ok(false),
                Some(doc) => doc.rev,
                None => None,
            };

            let document = CouchDocument::new(
                &doc_id,
                rev,
                LockBody { expires_at },
            );
            match store.put_document(&document).await? {
                PutOutcome::Written => Ok(true),
                PutOutcome::Conflict => Ok(false),
            }
        })
    }

    fn load_settings(&self) -> BoxFuture<'static, StorageResult<Option<PollSettings>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store.get_document::<SettingsBody>(SETTINGS_DOC_ID).await?;
            Ok(doc.map(|doc| doc.body.settings))
        })
    }

    fn save_settings(&self, settings: PollSettings) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_document::<SettingsBody, (), _>(SETTINGS_DOC_ID, |_| {
                    Mutation::Write(
                        SettingsBody {
                            settings: settings.clone(),
                        },
                        (),
                    )
                })
                .await
                .map_err(Into::into)
        })
    }

    fn last_ended_at(&self) -> BoxFuture<'static, StorageResult<Option<SystemTime>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store.get_document::<MarkerBody>(ENDED_DOC_ID).await?;
            Ok(doc.map(|doc| doc.body.at))
        })
    }

    fn mark_poll_ended(&self, at: SystemTime) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_document::<MarkerBody, (), _>(ENDED_DOC_ID, |_| {
                    Mutation::Write(MarkerBody { at }, ())
                })
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let path = store.database.to_string();
            let response = store
                .database_request(Method::GET)
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: path.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
