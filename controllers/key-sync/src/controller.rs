//! Main controller implementation.
//!
//! Re-reads the manifest on every pass and reconciles each store in turn.
//! Failed passes are retried on a Fibonacci backoff instead of the regular
//! interval; a concurrent modification is logged and simply left to the next
//! pass, which re-reads the store.

use crate::config::SyncConfig;
use crate::error::ControllerError;
use crate::manifest::Manifest;
use crate::reconciler::{Reconciler, StoreState};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use sync_core::FibonacciBackoff;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Smallest delay before retrying a failed pass
const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Drives reconcile passes until canceled.
pub struct Controller {
    reconciler: Reconciler,
    manifest_path: PathBuf,
    interval: Duration,
    /// Last observed state per store name
    stores: HashMap<String, StoreState>,
}

impl Controller {
    pub fn new(reconciler: Reconciler, config: &SyncConfig) -> Self {
        Self {
            reconciler,
            manifest_path: config.manifest_path.clone(),
            interval: config.interval,
            stores: HashMap::new(),
        }
    }

    /// State recorded for `name` by the last pass.
    pub fn store_state(&self, name: &str) -> Option<&StoreState> {
        self.stores.get(name)
    }

    /// One reconcile pass over the manifest.
    ///
    /// Every store is attempted even if an earlier one fails.
    pub async fn reconcile_once(&mut self, cancel: &CancellationToken) -> Result<(), ControllerError> {
        let manifest = Manifest::load(&self.manifest_path).await?;
        let mut failures = Vec::new();

        for spec in &manifest.stores {
            if cancel.is_cancelled() {
                break;
            }
            let known = self.stores.get(&spec.name);
            match self.reconciler.reconcile_store(spec, known, cancel).await {
                Ok(Some(state)) => {
                    debug!("Store '{}' in sync ({} keys)", spec.name, spec.keys.len());
                    self.stores.insert(spec.name.clone(), state);
                }
                Ok(None) => {
                    self.stores.remove(&spec.name);
                }
                Err(e) if e.is_conflict() => {
                    warn!("Store '{}' was modified concurrently, retrying next pass: {}", spec.name, e);
                    failures.push(spec.name.clone());
                }
                Err(e) => {
                    error!("Failed to reconcile store '{}': {}", spec.name, e);
                    failures.push(spec.name.clone());
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ControllerError::Reconciliation(format!(
                "{} of {} stores failed: {}",
                failures.len(),
                manifest.stores.len(),
                failures.join(", ")
            )))
        }
    }

    /// Run passes until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ControllerError> {
        info!(
            "Reconciling {} every {:?}",
            self.manifest_path.display(),
            self.interval
        );
        let mut backoff = FibonacciBackoff::new(MIN_RETRY_DELAY, self.interval);

        loop {
            let delay = match self.reconcile_once(&cancel).await {
                Ok(()) => {
                    backoff.reset();
                    self.interval
                }
                Err(e) => {
                    let delay = backoff.next_interval();
                    warn!("Reconcile pass failed, retrying in {:?}: {}", delay, e);
                    delay
                }
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        info!("Controller stopped");
        Ok(())
    }
}
