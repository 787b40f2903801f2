//! Store lifecycle: create or adopt, wait for READY, delete and wait for it
//! to disappear.

use super::{Reconciler, StoreState};
use crate::error::ControllerError;
use crate::manifest::StoreSpec;
use store_client::{CreateStoreRequest, KeyValueStore, StoreError, StoreStatus};
use sync_core::{wait_for_absence, wait_for_state};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl Reconciler {
    /// Describe a store, mapping 404 to `None` for the state poller.
    pub(crate) async fn find_store(&self, store_id: &str) -> Result<Option<KeyValueStore>, StoreError> {
        match self.client.describe_store(store_id).await {
            Ok(store) => Ok(Some(store)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Block until the store reports READY.
    pub(crate) async fn wait_until_ready(
        &self,
        store_id: &str,
        cancel: &CancellationToken,
    ) -> Result<KeyValueStore, ControllerError> {
        let spec = self.wait.until_ready();
        let store = wait_for_state(&spec, cancel, || self.find_store(store_id)).await?;
        info!("Store {} is {}", store_id, store.status);
        Ok(store)
    }

    /// Create the store described by `spec` and wait for it to become READY.
    pub async fn create_store(
        &self,
        spec: &StoreSpec,
        cancel: &CancellationToken,
    ) -> Result<StoreState, ControllerError> {
        let created = self
            .client
            .create_store(&CreateStoreRequest {
                name: spec.name.clone(),
                comment: spec.comment.clone(),
            })
            .await?;
        info!("Created store '{}' as {} ({})", spec.name, created.id, created.status);

        let store = self.wait_until_ready(&created.id, cancel).await?;
        Ok(to_state(store))
    }

    /// Find the store named `name`, in any state.
    ///
    /// Store names are unique on the API side; two matches are reported as an
    /// error rather than guessing.
    pub async fn find_store_by_name(&self, name: &str) -> Result<Option<KeyValueStore>, ControllerError> {
        let mut matches: Vec<KeyValueStore> = self
            .client
            .list_stores()
            .await?
            .into_iter()
            .filter(|store| store.name == name)
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(ControllerError::Reconciliation(format!(
                "{} stores are named '{}': {}",
                n,
                name,
                matches.iter().map(|s| s.id.as_str()).collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// Return a READY store for `spec`.
    ///
    /// Uses `store_id` when it still exists, otherwise a store already named
    /// `spec.name` (e.g. one whose creation we stopped waiting for, or one
    /// created before a restart), and only creates a new store if neither
    /// exists.
    pub async fn ensure_store(
        &self,
        spec: &StoreSpec,
        store_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<StoreState, ControllerError> {
        let existing = match store_id {
            Some(store_id) => match self.find_store(store_id).await? {
                Some(store) => Some(store),
                None if spec.id.as_deref() == Some(store_id) => {
                    return Err(ControllerError::NotFound(format!(
                        "store {} named by the manifest for '{}'",
                        store_id, spec.name
                    )));
                }
                None => {
                    warn!(
                        "Store {} ('{}') no longer exists (drift detected)",
                        store_id, spec.name
                    );
                    self.find_store_by_name(&spec.name).await?
                }
            },
            None => self.find_store_by_name(&spec.name).await?,
        };

        match existing {
            Some(store) => self.adopt_store(spec, store, cancel).await,
            None => self.create_store(spec, cancel).await,
        }
    }

    async fn adopt_store(
        &self,
        spec: &StoreSpec,
        store: KeyValueStore,
        cancel: &CancellationToken,
    ) -> Result<StoreState, ControllerError> {
        match store.status {
            StoreStatus::Ready => {
                debug!("Store {} ('{}') is READY", store.id, spec.name);
                Ok(to_state(store))
            }
            StoreStatus::Provisioning => {
                debug!("Store {} ('{}') is still provisioning", store.id, spec.name);
                Ok(to_state(self.wait_until_ready(&store.id, cancel).await?))
            }
            status => Err(ControllerError::Reconciliation(format!(
                "store {} ('{}') is {}{}",
                store.id,
                spec.name,
                status,
                store
                    .failure_reason
                    .map(|reason| format!(": {}", reason))
                    .unwrap_or_default()
            ))),
        }
    }

    /// Issue the delete with the store's current ETag. Returns false if the
    /// store was already gone.
    async fn request_store_deletion(&self, store_id: &str) -> Result<bool, StoreError> {
        let Some(store) = self.find_store(store_id).await? else {
            return Ok(false);
        };
        if store.status == StoreStatus::Deleting {
            return Ok(true);
        }
        let etag = store
            .etag
            .ok_or_else(|| StoreError::Api(format!("store {} returned no ETag", store_id)))?;
        match self.client.delete_store(store_id, &etag).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete a store and wait until it is gone. A missing store is success.
    pub async fn delete_store(
        &self,
        store_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ControllerError> {
        let deleted = self
            .concurrency
            .with_lock(store_id, cancel, || self.request_store_deletion(store_id))
            .await??;

        if !deleted {
            debug!("Store {} already deleted", store_id);
            return Ok(());
        }

        info!("Deleting store {}", store_id);
        let spec = self.wait.until_deleted();
        wait_for_absence(&spec, cancel, || self.find_store(store_id)).await?;
        info!("Store {} deleted", store_id);
        Ok(())
    }
}

fn to_state(store: KeyValueStore) -> StoreState {
    StoreState {
        id: store.id,
        name: store.name,
        status: store.status,
        etag: store.etag,
        last_synced: None,
    }
}
