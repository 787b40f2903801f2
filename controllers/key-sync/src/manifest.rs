//! Desired state: the YAML manifest listing stores and their keys.
//!
//! ```yaml
//! stores:
//!   - name: edge-config
//!     comment: Edge routing flags
//!     prune: true
//!     keys:
//!       greeting: hello
//!       feature.beta: "on"
//!   - name: retired
//!     id: kvs-7
//!     ensure: absent
//! ```

use crate::error::ControllerError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Whether a store should exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// Desired state of one store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSpec {
    /// Store name, unique within the manifest
    pub name: String,
    /// Free-text comment set on create
    #[serde(default)]
    pub comment: Option<String>,
    /// Adopt an existing store instead of creating one
    #[serde(default)]
    pub id: Option<String>,
    /// Whether the store should exist
    #[serde(default)]
    pub ensure: Ensure,
    /// Delete keys present in the store but not listed here
    #[serde(default)]
    pub prune: bool,
    /// Keys and the values they must hold
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

/// Parsed manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Managed stores, reconciled in order
    #[serde(default)]
    pub stores: Vec<StoreSpec>,
}

impl Manifest {
    /// Read and validate the manifest at `path`.
    pub async fn load(path: &Path) -> Result<Self, ControllerError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ControllerError::Manifest(format!("reading {}: {}", path.display(), e))
        })?;
        Self::parse(&raw)
    }

    /// Parse and validate manifest YAML.
    pub fn parse(raw: &str) -> Result<Self, ControllerError> {
        let manifest: Manifest =
            serde_yaml::from_str(raw).map_err(|e| ControllerError::Manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ControllerError> {
        let mut names = HashSet::new();
        for store in &self.stores {
            if store.name.is_empty() {
                return Err(ControllerError::Manifest("store name must not be empty".to_string()));
            }
            if !names.insert(store.name.as_str()) {
                return Err(ControllerError::Manifest(format!(
                    "store '{}' is listed more than once",
                    store.name
                )));
            }
            if store.id.as_deref() == Some("") {
                return Err(ControllerError::Manifest(format!(
                    "store '{}': id must not be empty",
                    store.name
                )));
            }
            if store.ensure == Ensure::Absent && !store.keys.is_empty() {
                return Err(ControllerError::Manifest(format!(
                    "store '{}' is absent but lists keys",
                    store.name
                )));
            }
            if store.keys.keys().any(String::is_empty) {
                return Err(ControllerError::Manifest(format!(
                    "store '{}' has an empty key name",
                    store.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_example() {
        let manifest = Manifest::parse(
            r#"
stores:
  - name: edge-config
    comment: Edge routing flags
    prune: true
    keys:
      greeting: hello
      feature.beta: "on"
  - name: retired
    id: kvs-7
    ensure: absent
"#,
        )
        .unwrap();

        assert_eq!(manifest.stores.len(), 2);
        let edge = &manifest.stores[0];
        assert_eq!(edge.ensure, Ensure::Present);
        assert!(edge.prune);
        assert_eq!(edge.keys.get("feature.beta").map(String::as_str), Some("on"));
        assert_eq!(edge.id, None);

        let retired = &manifest.stores[1];
        assert_eq!(retired.ensure, Ensure::Absent);
        assert_eq!(retired.id.as_deref(), Some("kvs-7"));
        assert!(retired.keys.is_empty());
    }

    #[test]
    fn test_empty_manifest() {
        assert_eq!(Manifest::parse("stores: []").unwrap(), Manifest::default());
    }

    #[test]
    fn test_rejects_duplicate_store() {
        let err = Manifest::parse(
            r#"
stores:
  - name: a
  - name: a
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_keys_on_absent_store() {
        let err = Manifest::parse(
            r#"
stores:
  - name: a
    ensure: absent
    keys:
      k: v
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ControllerError::Manifest(_)));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(Manifest::parse("stores:\n  - name: a\n    colour: blue\n").is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = Manifest::load(Path::new("/nonexistent/key-sync.yaml")).await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/key-sync.yaml"));
    }
}
