//! Key-sync controller library
//!
//! Reconciles versioned key-value stores against a YAML manifest. The binary
//! in `main.rs` wires these pieces to the HTTP store client.

pub mod config;
pub mod controller;
pub mod error;
pub mod manifest;
pub mod reconciler;

pub use config::SyncConfig;
pub use controller::Controller;
pub use error::ControllerError;
pub use manifest::{Ensure, Manifest, StoreSpec};
pub use reconciler::{KeyState, Reconciler, StoreState, WaitSettings};
