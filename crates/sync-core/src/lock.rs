//! Named locks
//!
//! Process-local mutual exclusion keyed by the logical identity of a shared
//! remote object (e.g. the key-value store, not the key being written). This
//! only serializes callers inside one process; the remote compare-and-swap is
//! the guard against other processes.
//!
//! The registry is an injected capability rather than global state, so tests
//! can use their own instance and its lifetime belongs to the caller.

use crate::error::LockError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A held named lock. The lock is released when this value is dropped.
pub struct ScopedLock {
    identity: String,
    _held: Box<dyn Send + Sync>,
}

impl ScopedLock {
    /// Wrap whatever keeps the lock held; dropping `held` must release it.
    pub fn new(identity: impl Into<String>, held: impl Send + Sync + 'static) -> Self {
        Self {
            identity: identity.into(),
            _held: Box::new(held),
        }
    }

    /// Identity this lock was acquired for.
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl fmt::Debug for ScopedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedLock")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Source of named locks.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait LockRegistry: Send + Sync {
    /// Block until the lock for `identity` is held.
    async fn acquire(&self, identity: &str) -> ScopedLock;

    /// Like [`LockRegistry::acquire`], but gives up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// [`LockError::Canceled`] if cancellation fired before the lock was held.
    async fn acquire_or_cancel(
        &self,
        identity: &str,
        cancel: &CancellationToken,
    ) -> Result<ScopedLock, LockError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(LockError::Canceled {
                identity: identity.to_string(),
            }),
            lock = self.acquire(identity) => Ok(lock),
        }
    }

    /// Release a held lock.
    fn release(&self, lock: ScopedLock) {
        drop(lock);
    }
}

#[derive(Debug)]
struct Entry {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Holders plus waiters
    refs: usize,
}

type Entries = Arc<Mutex<HashMap<String, Entry>>>;

/// In-memory, reference-counted [`LockRegistry`].
///
/// Entries exist only while someone holds or waits for them, so acquiring
/// many distinct identities over time does not leak.
#[derive(Debug, Clone, Default)]
pub struct KeyedLockRegistry {
    entries: Entries,
}

impl KeyedLockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities currently held or waited for, sorted.
    pub fn active_identities(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut identities: Vec<String> = entries.keys().cloned().collect();
        identities.sort();
        identities
    }

    /// Number of identities currently held or waited for.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no lock is held or awaited.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, identity: &str) -> (Arc<tokio::sync::Mutex<()>>, Registration) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(identity.to_string()).or_insert_with(|| Entry {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            refs: 0,
        });
        entry.refs += 1;
        (
            Arc::clone(&entry.lock),
            Registration {
                identity: identity.to_string(),
                entries: Arc::clone(&self.entries),
            },
        )
    }
}

/// Drops one reference to an entry, pruning it at zero. Created before
/// waiting so an abandoned acquisition is accounted for too.
struct Registration {
    identity: String,
    entries: Entries,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(&self.identity) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(&self.identity);
            }
        }
    }
}

/// Field order matters: the mutex is unlocked before the reference is dropped.
struct Held {
    _guard: tokio::sync::OwnedMutexGuard<()>,
    _registration: Registration,
}

#[async_trait::async_trait]
impl LockRegistry for KeyedLockRegistry {
    async fn acquire(&self, identity: &str) -> ScopedLock {
        let (lock, registration) = self.register(identity);
        debug!("Waiting for lock on {}", identity);
        let guard = lock.lock_owned().await;
        debug!("Acquired lock on {}", identity);
        ScopedLock::new(
            identity,
            Held {
                _guard: guard,
                _registration: registration,
            },
        )
    }
}
