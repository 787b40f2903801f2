//! Key-value store API models
//!
//! A store is a container of string keys versioned as a whole: every
//! successful write to any key changes the store's ETag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use sync_core::wait::Status;

/// Lifecycle state of a key-value store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreStatus {
    Provisioning,
    Ready,
    Deleting,
    Failed,
    #[serde(other)]
    Unknown,
}

impl StoreStatus {
    /// Wire label, as used by the state poller.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreStatus::Provisioning => "PROVISIONING",
            StoreStatus::Ready => "READY",
            StoreStatus::Deleting => "DELETING",
            StoreStatus::Failed => "FAILED",
            StoreStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key-value store as returned by `GET /stores/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueStore {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub status: StoreStatus,
    /// Filled verbatim (quotes included) from the `ETag` response header, not the body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Status for KeyValueStore {
    fn current_state(&self) -> &str {
        self.status.as_str()
    }
}

/// Response of `GET /stores`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListStoresOutput {
    #[serde(default)]
    pub items: Vec<KeyValueStore>,
}

/// Request body for `POST /stores`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStoreRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// A single key and its value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub key: String,
    pub value: String,
}

/// Response of `GET /stores/{id}/keys`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListKeysOutput {
    #[serde(default)]
    pub items: Vec<KeyEntry>,
}

/// Request body for `PUT /stores/{id}/keys/{key}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutKeyRequest {
    pub value: String,
}

/// Response of a successful key write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutKeyOutput {
    /// New store ETag
    pub etag: String,
    #[serde(default)]
    pub item_count: u64,
    #[serde(default)]
    pub total_size_in_bytes: u64,
}

/// Response of a successful key deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteKeyOutput {
    /// New store ETag
    pub etag: String,
    #[serde(default)]
    pub item_count: u64,
    #[serde(default)]
    pub total_size_in_bytes: u64,
}
