//! Controller-specific error types.

use store_client::{KeyValueStore, StoreError};
use sync_core::{ConcurrencyError, IdError, LockError, WaitError};
use thiserror::Error;

/// Errors that can occur in the key-sync controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Store API error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Malformed composite identifier
    #[error("Invalid identifier: {0}")]
    Id(#[from] IdError),

    /// Store did not reach the expected lifecycle state
    #[error("Waiting for store: {0}")]
    Wait(#[from] WaitError<KeyValueStore>),

    /// Guarded key mutation failed
    #[error("Key update failed: {0}")]
    Concurrency(#[from] ConcurrencyError<StoreError>),

    /// Store lock could not be acquired
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Resource to import or read does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Manifest could not be read or is invalid
    #[error("Invalid manifest: {0}")]
    Manifest(String),

    /// Reconciliation failed
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),
}

impl ControllerError {
    /// Returns true if another writer modified the store between our read and
    /// our write. The next reconcile pass re-reads and retries.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::Concurrency(e) if e.is_conflict())
    }
}
