//! Resource synchronization core
//!
//! Building blocks shared by controllers that keep remote, asynchronously
//! provisioned resources in sync with a desired state.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use sync_core::{IdCodec, NotFoundPolicy, SyncedObject, WaitSpec, wait_for_state};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Composite identifier for a key inside a store
//! let codec = IdCodec::default();
//! let id = codec.encode(&["kvs-1", "greeting"], 2, false)?;
//! assert_eq!(id, "kvs-1,greeting");
//!
//! // Block until the store reports READY
//! let spec = WaitSpec::new(["PROVISIONING"], ["READY"], NotFoundPolicy::Fail, Duration::from_secs(120))
//!     .with_initial_delay(Duration::from_secs(5));
//! let ready = wait_for_state(&spec, &CancellationToken::new(), || async {
//!     Ok::<_, std::io::Error>(Some(SyncedObject::new((), "READY")))
//! })
//! .await?;
//! # let _ = ready;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Identifier Codec**: Join and split composite resource identifiers
//! - **State Poller**: Wait for lifecycle transitions with backoff and timeout
//! - **Optimistic Concurrency**: Named locks plus ETag-style compare-and-swap

pub mod backoff;
pub mod concurrency;
pub mod error;
pub mod id;
pub mod lock;
pub mod wait;

mod concurrency_test;

pub use backoff::FibonacciBackoff;
pub use concurrency::{ConcurrencyController, Versioned, VersionedRemote};
pub use error::{BoxError, ConcurrencyError, IdError, LockError, WaitError, WriteError};
pub use id::{IdCodec, ResourceId};
pub use lock::{KeyedLockRegistry, LockRegistry, ScopedLock};
pub use wait::{NotFoundPolicy, Status, SyncedObject, WaitSpec, wait_for_absence, wait_for_state, wait_until};
