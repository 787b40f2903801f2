//! Key operations. Every write presents the store ETag read under the store
//! lock; a stale ETag surfaces as a concurrent modification and is left to
//! the next pass.

use super::{KeyState, Reconciler, StoreKeyRemote};
use crate::error::ControllerError;
use chrono::Utc;
use std::convert::Infallible;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Parts of a key's composite id: store id, key name
const KEY_ID_PARTS: usize = 2;

impl Reconciler {
    /// Composite id of `key` in `store_id`.
    pub fn key_id(&self, store_id: &str, key: &str) -> Result<String, ControllerError> {
        Ok(self.codec.encode(&[store_id, key], KEY_ID_PARTS, false)?)
    }

    /// Write `value` unless the key already holds it.
    pub async fn sync_key(
        &self,
        store_id: &str,
        key: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<KeyState, ControllerError> {
        let id = self.key_id(store_id, key)?;
        if let Some(current) = self.read_key(&id).await? {
            if current.value == value {
                debug!("Key {} is up to date", id);
                return Ok(current);
            }
        }
        self.put_key(store_id, key, value, cancel).await
    }

    /// Write `value` under the store's current ETag.
    pub async fn put_key(
        &self,
        store_id: &str,
        key: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<KeyState, ControllerError> {
        let id = self.key_id(store_id, key)?;
        let remote = StoreKeyRemote::new(&*self.client, key);

        let written = self
            .concurrency
            .mutate(&remote, store_id, cancel, |_current: &Option<String>| {
                Ok::<_, Infallible>(Some(value.to_string()))
            })
            .await?;
        info!("Wrote key {} (store ETag {})", id, written.token);

        Ok(KeyState {
            id,
            store_id: store_id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            etag: written.token,
            last_synced: Utc::now(),
        })
    }

    /// Delete `key` under the store's current ETag and return the store's new
    /// ETag. A key that is already gone is success.
    pub async fn delete_key(
        &self,
        store_id: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ControllerError> {
        let id = self.key_id(store_id, key)?;
        let remote = StoreKeyRemote::new(&*self.client, key);

        let written = self
            .concurrency
            .mutate(&remote, store_id, cancel, |_current: &Option<String>| Ok::<_, Infallible>(None))
            .await?;
        info!("Deleted key {}", id);
        Ok(written.token)
    }

    /// Read the key named by composite `id`; `None` if the key or its store
    /// no longer exists.
    pub async fn read_key(&self, id: &str) -> Result<Option<KeyState>, ControllerError> {
        let parts = self.codec.decode(id, KEY_ID_PARTS, false)?;
        let (store_id, key) = (&parts[0], &parts[1]);

        let Some(store) = self.find_store(store_id).await? else {
            debug!("Store {} for key {} not found", store_id, id);
            return Ok(None);
        };
        let entry = match self.client.get_key(store_id, key).await {
            Ok(entry) => entry,
            Err(e) if e.is_not_found() => {
                debug!("Key {} not found", id);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(KeyState {
            id: id.to_string(),
            store_id: store_id.clone(),
            key: entry.key,
            value: entry.value,
            etag: store.etag.unwrap_or_default(),
            last_synced: Utc::now(),
        }))
    }

    /// Adopt an existing key by composite id.
    pub async fn import_key(&self, id: &str) -> Result<KeyState, ControllerError> {
        self.read_key(id)
            .await?
            .ok_or_else(|| ControllerError::NotFound(format!("key {}", id)))
    }
}
