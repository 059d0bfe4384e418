use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_store::CommitObject;
use strata_types::ObjectId;

/// Read-only view of one revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// 64-character hex hash.
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    pub author: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    /// Hash of the snapshot tree.
    pub tree: String,
}

impl Commit {
    pub(crate) fn from_object(id: ObjectId, object: &CommitObject) -> Self {
        Self {
            hash: id.to_hex(),
            parent: object.parent.map(|p| p.to_hex()),
            message: object.message.clone(),
            body: object.body.clone(),
            author: object.author.name.clone(),
            author_email: object.author.email.clone(),
            timestamp: object.timestamp,
            tree: object.tree.to_hex(),
        }
    }

    /// First 8 characters of the hash.
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(8)]
    }
}

/// Split a message into its subject line and the remaining body.
pub(crate) fn split_message(message: &str) -> (String, String) {
    let message = message.trim();
    match message.split_once('\n') {
        Some((subject, body)) => (subject.trim().to_string(), body.trim().to_string()),
        None => (message.to_string(), String::new()),
    }
}
