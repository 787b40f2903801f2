//! Key-value store REST API client
//!
//! A client for a versioned key-value store whose mutations are guarded by
//! the store's `ETag` (`If-Match` precondition, `412` on mismatch).
//!
//! # Example
//!
//! ```no_run
//! use store_client::{HttpStoreClient, StoreClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpStoreClient::new("http://kvs:8080".to_string())?;
//!
//! // Every write presents the store's current ETag
//! let store = client.describe_store("kvs-1").await?;
//! let etag = store.etag.unwrap_or_default();
//! let out = client.put_key("kvs-1", "greeting", "hello", &etag).await?;
//! println!("new ETag: {}", out.etag);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::HttpStoreClient;
pub use error::StoreError;
pub use models::*;
pub use store_trait::StoreClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockStoreClient;
