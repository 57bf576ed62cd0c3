use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::state::poll::{PollSettings, PollState, QueuedPoll};

pub const POLL_DOC_ID: &str = "poll_current";
pub const QUEUE_DOC_ID: &str = "poll_queue";
pub const SETTINGS_DOC_ID: &str = "poll_settings";
pub const ENDED_DOC_ID: &str = "poll_last_ended";
pub const LOCK_PREFIX: &str = "lock_";

/// Envelope adding CouchDB's identity and revision to a document body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> CouchDocument<T> {
    pub fn new(id: &str, rev: Option<String>, body: T) -> Self {
        Self {
            id: id.to_string(),
            rev,
            body,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollBody {
    pub state: PollState,
    pub modified_at: SystemTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueBody {
    pub items: Vec<QueuedPoll>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsBody {
    pub settings: PollSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerBody {
    pub at: SystemTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockBody {
    pub expires_at: SystemTime,
}

/// Document id backing the lock named `key`.
pub fn lock_doc_id(key: &str) -> String {
    format!("{LOCK_PREFIX}{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_documents_omit_revision() {
        let doc = CouchDocument::new(QUEUE_DOC_ID, None, QueueBody::default());
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["_id"], QUEUE_DOC_ID);
        assert!(value.get("_rev").is_none());
        assert!(value["items"].as_array().unwrap().is_empty());
    }

    #[test]
    fn revision_is_read_back_from_couch_payload() {
        let payload = serde_json::json!({
            "_id": POLL_DOC_ID,
            "_rev": "3-abc",
            "state": { "status": "empty" },
            "modified_at": { "secs_since_epoch": 10, "nanos_since_epoch": 0 },
        });

        let doc: CouchDocument<PollBody> = serde_json::from_value(payload).unwrap();
        assert_eq!(doc.rev.as_deref(), Some("3-abc"));
        assert_eq!(doc.body.state, PollState::Empty);
    }

    #[test]
    fn lock_ids_are_prefixed() {
        assert_eq!(lock_doc_id("poll-ending"), "lock_poll-ending");
    }
}
