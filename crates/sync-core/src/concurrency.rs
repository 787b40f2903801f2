//! # Optimistic Concurrency Controller
//!
//! Serializes read-modify-write sequences against a remote object that is
//! versioned with a compare-and-swap token (an ETag, a revision number, ...).
//!
//! Two layers of protection:
//! 1. a named lock per shared object identity, so callers in this process
//!    never race each other into needless precondition failures;
//! 2. the remote precondition check, the only guard against other processes.
//!
//! A precondition failure is reported as
//! [`ConcurrencyError::ConcurrentModification`] and never retried here: only
//! the caller knows whether re-applying its change on top of someone else's is
//! safe.

use crate::error::{BoxError, ConcurrencyError, LockError, WriteError};
use crate::lock::{KeyedLockRegistry, LockRegistry};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A value together with the version token it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<V, T> {
    /// The value as read or written
    pub value: V,
    /// Version token the value belongs to
    pub token: T,
}

impl<V, T> Versioned<V, T> {
    /// Pair a value with its version token.
    pub fn new(value: V, token: T) -> Self {
        Self { value, token }
    }
}

/// Remote compare-and-swap contract.
///
/// Every read returns a fresh token; a write must present the token of the
/// read it is based on and is rejected with [`WriteError::PreconditionFailed`]
/// if the object changed since.
#[async_trait::async_trait]
pub trait VersionedRemote: Send + Sync {
    /// Value read and written
    type Value: Send + Sync;
    /// Version token presented on writes
    type Token: Clone + fmt::Display + Send + Sync;
    /// Remote failure other than a precondition mismatch
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the current value and its version token.
    async fn read(&self, identity: &str) -> Result<Versioned<Self::Value, Self::Token>, Self::Error>;

    /// Write `value` if the object is still at version `expected`.
    async fn write(
        &self,
        identity: &str,
        value: Self::Value,
        expected: &Self::Token,
    ) -> Result<Versioned<Self::Value, Self::Token>, WriteError<Self::Error>>;
}

/// Version-guarded mutation of shared remote objects.
#[derive(Debug)]
pub struct ConcurrencyController<L = KeyedLockRegistry> {
    locks: Arc<L>,
}

impl<L> Clone for ConcurrencyController<L> {
    fn clone(&self) -> Self {
        Self {
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<L: LockRegistry> ConcurrencyController<L> {
    /// Create a controller backed by `locks`.
    ///
    /// Every controller that may touch the same remote objects must share the
    /// same registry.
    pub fn new(locks: Arc<L>) -> Self {
        Self { locks }
    }

    /// The lock registry in use.
    pub fn locks(&self) -> &Arc<L> {
        &self.locks
    }

    /// Read, transform and conditionally write the object named `identity`.
    ///
    /// `build` receives the freshly read value and returns the value to write.
    /// The named lock for `identity` is held from before the read until the
    /// write has completed or failed, and released on every path.
    ///
    /// # Errors
    ///
    /// * [`ConcurrencyError::Lock`] if `cancel` fired while waiting for the lock
    /// * [`ConcurrencyError::Read`] / [`ConcurrencyError::Write`] for remote failures
    /// * [`ConcurrencyError::Build`] if `build` rejected the current value
    /// * [`ConcurrencyError::ConcurrentModification`] if another writer got in first
    pub async fn mutate<R, F, BE>(
        &self,
        remote: &R,
        identity: &str,
        cancel: &CancellationToken,
        build: F,
    ) -> Result<Versioned<R::Value, R::Token>, ConcurrencyError<R::Error>>
    where
        R: VersionedRemote + ?Sized,
        F: FnOnce(&R::Value) -> Result<R::Value, BE>,
        BE: Into<BoxError>,
    {
        let _lock = self.locks.acquire_or_cancel(identity, cancel).await?;

        let current = remote
            .read(identity)
            .await
            .map_err(|source| ConcurrencyError::Read {
                identity: identity.to_string(),
                source,
            })?;
        debug!("Read {} at version {}", identity, current.token);

        let desired = build(&current.value).map_err(|source| ConcurrencyError::Build {
            identity: identity.to_string(),
            source: source.into(),
        })?;

        match remote.write(identity, desired, &current.token).await {
            Ok(written) => {
                debug!(
                    "Wrote {} (version {} -> {})",
                    identity, current.token, written.token
                );
                Ok(written)
            }
            Err(WriteError::PreconditionFailed) => {
                warn!(
                    "Write to {} rejected: version {} is stale, another writer modified it",
                    identity, current.token
                );
                Err(ConcurrencyError::ConcurrentModification {
                    identity: identity.to_string(),
                    token: current.token.to_string(),
                })
            }
            Err(WriteError::Remote(source)) => Err(ConcurrencyError::Write {
                identity: identity.to_string(),
                source,
            }),
        }
    }

    /// Run `critical` while holding the named lock for `identity`.
    ///
    /// For remote contracts that are not a single read/write pair, e.g. reading
    /// a container's version token and then writing one item of it. The caller
    /// is responsible for presenting the token it read.
    ///
    /// # Errors
    ///
    /// [`LockError::Canceled`] if `cancel` fired while waiting for the lock.
    pub async fn with_lock<T, C, Fut>(
        &self,
        identity: &str,
        cancel: &CancellationToken,
        critical: C,
    ) -> Result<T, LockError>
    where
        C: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.locks.acquire_or_cancel(identity, cancel).await?;
        let output = critical().await;
        self.locks.release(lock);
        Ok(output)
    }
}
