//! Reconciliation logic for stores and their keys.
//!
//! - `store`: create/adopt/delete stores, waiting on provisioning and deletion
//! - `key`: write/delete/read/import individual keys under the store's ETag

mod key;
mod remote;
mod store;


pub use remote::StoreKeyRemote;

use crate::config::SyncConfig;
use crate::error::ControllerError;
use crate::manifest::{Ensure, StoreSpec};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Duration;
use store_client::{StoreClientTrait, StoreStatus};
use sync_core::{ConcurrencyController, IdCodec, NotFoundPolicy, WaitSpec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Not-found observations tolerated right after create
const CREATE_NOT_FOUND_CHECKS: u32 = 3;

/// Observed state of a managed store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreState {
    /// Store id assigned by the API
    pub id: String,
    /// Store name
    pub name: String,
    /// Lifecycle state when last observed
    pub status: StoreStatus,
    /// Store ETag when last observed or written
    pub etag: Option<String>,
    /// End of the last successful reconcile of this store
    pub last_synced: Option<DateTime<Utc>>,
}

/// Observed state of a managed key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyState {
    /// Composite id: `<store id>,<key>`, with `,` and `\` in parts escaped
    pub id: String,
    /// Id of the containing store
    pub store_id: String,
    /// Key name
    pub key: String,
    /// Value when last read or written
    pub value: String,
    /// Store ETag after the last write or read
    pub etag: String,
    /// When the key was last read or written
    pub last_synced: DateTime<Utc>,
}

/// Timing of store provisioning/deletion waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    /// Upper bound for one wait
    pub timeout: Duration,
    /// Floor between two describe calls
    pub min_interval: Duration,
    /// Grace period before the first describe
    pub initial_delay: Duration,
}

impl WaitSettings {
    /// Wait timings from the controller configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            timeout: config.wait_timeout,
            min_interval: config.wait_min_interval,
            initial_delay: config.wait_delay,
        }
    }

    fn until_ready(&self) -> WaitSpec {
        WaitSpec::new(
            [StoreStatus::Provisioning.as_str()],
            [StoreStatus::Ready.as_str()],
            NotFoundPolicy::Pending {
                max_checks: CREATE_NOT_FOUND_CHECKS,
            },
            self.timeout,
        )
        .with_min_interval(self.min_interval)
        .with_initial_delay(self.initial_delay)
    }

    fn until_deleted(&self) -> WaitSpec {
        WaitSpec::for_deletion([StoreStatus::Deleting.as_str()], self.timeout)
            .with_min_interval(self.min_interval)
            .with_initial_delay(self.initial_delay)
    }
}

/// Reconciles stores and keys against a store API.
pub struct Reconciler {
    pub(crate) client: Box<dyn StoreClientTrait + Send + Sync>,
    pub(crate) concurrency: ConcurrencyController,
    pub(crate) codec: IdCodec,
    pub(crate) wait: WaitSettings,
}

impl Reconciler {
    /// Create a reconciler. Share `concurrency` with every other writer to the
    /// same stores.
    pub fn new(
        client: Box<dyn StoreClientTrait + Send + Sync>,
        concurrency: ConcurrencyController,
        wait: WaitSettings,
    ) -> Self {
        Self {
            client,
            concurrency,
            codec: IdCodec::default_escaping(),
            wait,
        }
    }

    /// Bring one store and its keys in line with `spec`.
    ///
    /// `known` is the state recorded by the previous pass, if any. Returns the
    /// new state, or `None` once the store is absent.
    pub async fn reconcile_store(
        &self,
        spec: &StoreSpec,
        known: Option<&StoreState>,
        cancel: &CancellationToken,
    ) -> Result<Option<StoreState>, ControllerError> {
        let store_id = spec.id.as_deref().or(known.map(|s| s.id.as_str()));

        if spec.ensure == Ensure::Absent {
            let store_id = match store_id {
                Some(store_id) => Some(store_id.to_string()),
                None => self.find_store_by_name(&spec.name).await?.map(|store| store.id),
            };
            match store_id {
                Some(store_id) => self.delete_store(&store_id, cancel).await?,
                None => debug!("Store '{}' is absent and does not exist", spec.name),
            }
            return Ok(None);
        }

        let mut state = self.ensure_store(spec, store_id, cancel).await?;

        for (key, value) in &spec.keys {
            let key_state = self.sync_key(&state.id, key, value, cancel).await?;
            state.etag = Some(key_state.etag);
        }

        if spec.prune {
            let wanted: BTreeSet<&str> = spec.keys.keys().map(String::as_str).collect();
            for entry in self.client.list_keys(&state.id).await? {
                if !wanted.contains(entry.key.as_str()) {
                    info!("Pruning unmanaged key '{}' from store {}", entry.key, state.id);
                    state.etag = Some(self.delete_key(&state.id, &entry.key, cancel).await?);
                }
            }
        }

        state.last_synced = Some(Utc::now());
        Ok(Some(state))
    }
}
