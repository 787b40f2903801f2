//! StoreClient trait for mocking
//!
//! The concrete HttpStoreClient implements this trait, and tests can use the
//! in-memory MockStoreClient instead.

use crate::error::StoreError;
use crate::models::*;

/// Trait for key-value store API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait StoreClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    // Store operations
    async fn list_stores(&self) -> Result<Vec<KeyValueStore>, StoreError>;
    async fn describe_store(&self, store_id: &str) -> Result<KeyValueStore, StoreError>;
    async fn create_store(&self, request: &CreateStoreRequest) -> Result<KeyValueStore, StoreError>;
    async fn delete_store(&self, store_id: &str, if_match: &str) -> Result<(), StoreError>;

    // Key operations
    async fn list_keys(&self, store_id: &str) -> Result<Vec<KeyEntry>, StoreError>;
    async fn get_key(&self, store_id: &str, key: &str) -> Result<KeyEntry, StoreError>;
    async fn put_key(&self, store_id: &str, key: &str, value: &str, if_match: &str) -> Result<PutKeyOutput, StoreError>;
    async fn delete_key(&self, store_id: &str, key: &str, if_match: &str) -> Result<DeleteKeyOutput, StoreError>;
}
