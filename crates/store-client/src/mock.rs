//! Mock StoreClient for unit testing
//!
//! In-memory implementation of StoreClientTrait. Stores move through
//! `PROVISIONING` and `DELETING` over a configurable number of describe calls,
//! every write rotates the store ETag, and a second writer can be simulated
//! with [`MockStoreClient::external_put`].

use crate::error::StoreError;
use crate::models::*;
use crate::store_trait::StoreClientTrait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct MockStore {
    store: KeyValueStore,
    keys: BTreeMap<String, String>,
    /// Describe calls left before a PROVISIONING/DELETING transition completes
    pending_polls: u32,
}

impl MockStore {
    fn rotate_etag(&mut self) -> String {
        let etag = uuid::Uuid::new_v4().to_string();
        self.store.etag = Some(etag.clone());
        self.store.last_modified = Some(Utc::now());
        etag
    }

    fn check_etag(&self, if_match: &str) -> Result<(), StoreError> {
        match &self.store.etag {
            Some(current) if current == if_match => Ok(()),
            _ => Err(StoreError::PreconditionFailed(format!(
                "store {}: ETag {} is not current",
                self.store.id, if_match
            ))),
        }
    }

    fn size_in_bytes(&self) -> u64 {
        self.keys.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum()
    }
}

/// Mock StoreClient for testing
#[derive(Debug, Clone)]
pub struct MockStoreClient {
    base_url: String,
    stores: Arc<Mutex<HashMap<String, MockStore>>>,
    transition_polls: u32,
    // If-Match values presented on mutations, in call order
    presented_etags: Arc<Mutex<Vec<String>>>,
    next_id: Arc<Mutex<u64>>,
}

impl MockStoreClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            stores: Arc::new(Mutex::new(HashMap::new())),
            transition_polls: 0,
            presented_etags: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Number of describe calls a store keeps reporting PROVISIONING (after
    /// create) or DELETING (after delete) before the transition completes.
    pub fn with_transition_polls(mut self, polls: u32) -> Self {
        self.transition_polls = polls;
        self
    }

    fn next_id(&self) -> String {
        let mut id = self.next_id.lock().unwrap();
        let current = *id;
        *id += 1;
        format!("kvs-{}", current)
    }

    /// Insert a store that is already READY
    pub fn insert_ready_store(&self, name: &str) -> KeyValueStore {
        let mut entry = MockStore {
            store: KeyValueStore {
                id: self.next_id(),
                name: name.to_string(),
                comment: None,
                status: StoreStatus::Ready,
                etag: None,
                failure_reason: None,
                created: Some(Utc::now()),
                last_modified: None,
            },
            keys: BTreeMap::new(),
            pending_polls: 0,
        };
        entry.rotate_etag();
        let store = entry.store.clone();
        self.stores.lock().unwrap().insert(store.id.clone(), entry);
        store
    }

    /// Simulate a writer in another process: bypasses preconditions and
    /// rotates the ETag. Returns the new ETag.
    pub fn external_put(&self, store_id: &str, key: &str, value: &str) -> Option<String> {
        let mut stores = self.stores.lock().unwrap();
        let entry = stores.get_mut(store_id)?;
        entry.keys.insert(key.to_string(), value.to_string());
        Some(entry.rotate_etag())
    }

    /// Current value of a key, bypassing the API
    pub fn key_value(&self, store_id: &str, key: &str) -> Option<String> {
        self.stores
            .lock()
            .unwrap()
            .get(store_id)
            .and_then(|entry| entry.keys.get(key).cloned())
    }

    /// Current ETag of a store, bypassing the API
    pub fn store_etag(&self, store_id: &str) -> Option<String> {
        self.stores
            .lock()
            .unwrap()
            .get(store_id)
            .and_then(|entry| entry.store.etag.clone())
    }

    /// Whether a store exists (in any state)
    pub fn contains_store(&self, store_id: &str) -> bool {
        self.stores.lock().unwrap().contains_key(store_id)
    }

    /// Simulate an API that stops returning the store's ETag
    pub fn clear_etag(&self, store_id: &str) {
        if let Some(entry) = self.stores.lock().unwrap().get_mut(store_id) {
            entry.store.etag = None;
        }
    }

    /// If-Match values presented on mutations so far
    pub fn presented_etags(&self) -> Vec<String> {
        self.presented_etags.lock().unwrap().clone()
    }

    fn record_if_match(&self, if_match: &str) {
        self.presented_etags.lock().unwrap().push(if_match.to_string());
    }

    fn not_found(store_id: &str) -> StoreError {
        StoreError::NotFound(format!("Store {} not found", store_id))
    }
}

#[async_trait::async_trait]
impl StoreClientTrait for MockStoreClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_stores(&self) -> Result<Vec<KeyValueStore>, StoreError> {
        let stores = self.stores.lock().unwrap();
        let mut items: Vec<KeyValueStore> = stores.values().map(|entry| entry.store.clone()).collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn describe_store(&self, store_id: &str) -> Result<KeyValueStore, StoreError> {
        let mut stores = self.stores.lock().unwrap();
        let entry = stores.get_mut(store_id).ok_or_else(|| Self::not_found(store_id))?;

        if matches!(entry.store.status, StoreStatus::Provisioning | StoreStatus::Deleting) {
            if entry.pending_polls > 0 {
                entry.pending_polls -= 1;
            } else if entry.store.status == StoreStatus::Provisioning {
                entry.store.status = StoreStatus::Ready;
            } else {
                stores.remove(store_id);
                return Err(Self::not_found(store_id));
            }
        }

        Ok(entry.store.clone())
    }

    async fn create_store(&self, request: &CreateStoreRequest) -> Result<KeyValueStore, StoreError> {
        if request.name.is_empty() {
            return Err(StoreError::InvalidRequest("store name must not be empty".to_string()));
        }

        let mut stores = self.stores.lock().unwrap();
        if stores.values().any(|entry| entry.store.name == request.name) {
            return Err(StoreError::Api(format!("Store {} already exists", request.name)));
        }

        let mut entry = MockStore {
            store: KeyValueStore {
                id: self.next_id(),
                name: request.name.clone(),
                comment: request.comment.clone(),
                status: StoreStatus::Provisioning,
                etag: None,
                failure_reason: None,
                created: Some(Utc::now()),
                last_modified: None,
            },
            keys: BTreeMap::new(),
            pending_polls: self.transition_polls,
        };
        entry.rotate_etag();
        let store = entry.store.clone();
        stores.insert(store.id.clone(), entry);
        Ok(store)
    }

    async fn delete_store(&self, store_id: &str, if_match: &str) -> Result<(), StoreError> {
        self.record_if_match(if_match);
        let mut stores = self.stores.lock().unwrap();
        let entry = stores.get_mut(store_id).ok_or_else(|| Self::not_found(store_id))?;
        entry.check_etag(if_match)?;
        entry.store.status = StoreStatus::Deleting;
        entry.pending_polls = self.transition_polls;
        Ok(())
    }

    async fn list_keys(&self, store_id: &str) -> Result<Vec<KeyEntry>, StoreError> {
        let stores = self.stores.lock().unwrap();
        let entry = stores.get(store_id).ok_or_else(|| Self::not_found(store_id))?;
        Ok(entry
            .keys
            .iter()
            .map(|(key, value)| KeyEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn get_key(&self, store_id: &str, key: &str) -> Result<KeyEntry, StoreError> {
        let stores = self.stores.lock().unwrap();
        let entry = stores.get(store_id).ok_or_else(|| Self::not_found(store_id))?;
        entry
            .keys
            .get(key)
            .map(|value| KeyEntry {
                key: key.to_string(),
                value: value.clone(),
            })
            .ok_or_else(|| StoreError::NotFound(format!("Key {} not found in store {}", key, store_id)))
    }

    async fn put_key(&self, store_id: &str, key: &str, value: &str, if_match: &str) -> Result<PutKeyOutput, StoreError> {
        self.record_if_match(if_match);
        let mut stores = self.stores.lock().unwrap();
        let entry = stores.get_mut(store_id).ok_or_else(|| Self::not_found(store_id))?;
        if entry.store.status != StoreStatus::Ready {
            return Err(StoreError::Api(format!(
                "Store {} is {}, not READY",
                store_id, entry.store.status
            )));
        }
        entry.check_etag(if_match)?;

        entry.keys.insert(key.to_string(), value.to_string());
        let etag = entry.rotate_etag();
        Ok(PutKeyOutput {
            etag,
            item_count: entry.keys.len() as u64,
            total_size_in_bytes: entry.size_in_bytes(),
        })
    }

    async fn delete_key(&self, store_id: &str, key: &str, if_match: &str) -> Result<DeleteKeyOutput, StoreError> {
        self.record_if_match(if_match);
        let mut stores = self.stores.lock().unwrap();
        let entry = stores.get_mut(store_id).ok_or_else(|| Self::not_found(store_id))?;
        entry.check_etag(if_match)?;

        if entry.keys.remove(key).is_none() {
            return Err(StoreError::NotFound(format!(
                "Key {} not found in store {}",
                key, store_id
            )));
        }
        let etag = entry.rotate_etag();
        Ok(DeleteKeyOutput {
            etag,
            item_count: entry.keys.len() as u64,
            total_size_in_bytes: entry.size_in_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_provisions_after_configured_polls() {
        let client = MockStoreClient::new("http://test-kvs").with_transition_polls(2);
        let created = client
            .create_store(&CreateStoreRequest {
                name: "edge-config".to_string(),
                comment: None,
            })
            .await
            .unwrap();
        assert_eq!(created.status, StoreStatus::Provisioning);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(client.describe_store(&created.id).await.unwrap().status);
        }
        assert_eq!(
            seen,
            vec![StoreStatus::Provisioning, StoreStatus::Provisioning, StoreStatus::Ready]
        );
    }

    #[tokio::test]
    async fn test_writes_rotate_etag_and_reject_stale() {
        let client = MockStoreClient::new("http://test-kvs");
        let store = client.insert_ready_store("edge-config");
        let first = store.etag.unwrap();

        let out = client.put_key(&store.id, "greeting", "hello", &first).await.unwrap();
        assert_ne!(out.etag, first);
        assert_eq!(out.item_count, 1);

        let err = client.put_key(&store.id, "greeting", "bye", &first).await.unwrap_err();
        assert!(err.is_precondition_failed());
        assert_eq!(client.key_value(&store.id, "greeting").as_deref(), Some("hello"));
        assert_eq!(client.presented_etags(), vec![first.clone(), first]);
    }

    #[tokio::test]
    async fn test_deleted_store_disappears() {
        let client = MockStoreClient::new("http://test-kvs").with_transition_polls(1);
        let store = client.insert_ready_store("edge-config");

        client
            .delete_store(&store.id, store.etag.as_deref().unwrap())
            .await
            .unwrap();

        let deleting = client.describe_store(&store.id).await.unwrap();
        assert_eq!(deleting.status, StoreStatus::Deleting);
        assert!(client.describe_store(&store.id).await.unwrap_err().is_not_found());
        assert!(!client.contains_store(&store.id));
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_not_found() {
        let client = MockStoreClient::new("http://test-kvs");
        let store = client.insert_ready_store("edge-config");

        let err = client
            .delete_key(&store.id, "absent", store.etag.as_deref().unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_stores_includes_provisioning() {
        let client = MockStoreClient::new("http://test-kvs").with_transition_polls(5);
        let ready = client.insert_ready_store("a");
        let provisioning = client
            .create_store(&CreateStoreRequest {
                name: "b".to_string(),
                comment: None,
            })
            .await
            .unwrap();

        let listed = client.list_stores().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ready.id);
        assert_eq!(listed[1].id, provisioning.id);
        assert_eq!(listed[1].status, StoreStatus::Provisioning);
    }
}
