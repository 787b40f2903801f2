//! One key of a store seen as a version-guarded remote object.
//!
//! The version token is the ETag of the whole store, so the identity handed
//! to the concurrency controller is the store id: writes to different keys of
//! one store still contend for the same token.

use store_client::{StoreClientTrait, StoreError};
use sync_core::{Versioned, VersionedRemote, WriteError};

/// Value `None` means the key is absent; writing `None` deletes it.
pub struct StoreKeyRemote<'a, C: ?Sized> {
    client: &'a C,
    key: &'a str,
}

impl<'a, C: ?Sized> StoreKeyRemote<'a, C> {
    pub fn new(client: &'a C, key: &'a str) -> Self {
        Self { client, key }
    }
}

#[async_trait::async_trait]
impl<'a, C> VersionedRemote for StoreKeyRemote<'a, C>
where
    C: StoreClientTrait + ?Sized,
{
    type Value = Option<String>;
    type Token = String;
    type Error = StoreError;

    async fn read(&self, store_id: &str) -> Result<Versioned<Option<String>, String>, StoreError> {
        // ETag first: a write landing between the two calls makes our token
        // stale, never our value newer than the token.
        let store = self.client.describe_store(store_id).await?;
        let etag = store
            .etag
            .ok_or_else(|| StoreError::Api(format!("store {} returned no ETag", store_id)))?;

        let value = match self.client.get_key(store_id, self.key).await {
            Ok(entry) => Some(entry.value),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        Ok(Versioned::new(value, etag))
    }

    async fn write(
        &self,
        store_id: &str,
        value: Option<String>,
        expected: &String,
    ) -> Result<Versioned<Option<String>, String>, WriteError<StoreError>> {
        let result = match value.as_deref() {
            Some(v) => self
                .client
                .put_key(store_id, self.key, v, expected)
                .await
                .map(|out| out.etag),
            None => match self.client.delete_key(store_id, self.key, expected).await {
                Ok(out) => Ok(out.etag),
                // Already gone: the store did not change
                Err(e) if e.is_not_found() => Ok(expected.clone()),
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(etag) => Ok(Versioned::new(value, etag)),
            Err(e) if e.is_precondition_failed() => Err(WriteError::PreconditionFailed),
            Err(e) => Err(WriteError::Remote(e)),
        }
    }
}
