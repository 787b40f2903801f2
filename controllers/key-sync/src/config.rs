//! Controller configuration from environment variables.

use crate::error::ControllerError;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_KVS_URL: &str = "http://kvs:8080";
const DEFAULT_INTERVAL_SECS: u64 = 60;
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 600;
const DEFAULT_WAIT_MIN_INTERVAL_SECS: u64 = 10;
const DEFAULT_WAIT_DELAY_SECS: u64 = 30;

/// Validated controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Store API base URL (`KVS_URL`)
    pub kvs_url: String,
    /// Path of the YAML manifest (`KEY_SYNC_MANIFEST`, required)
    pub manifest_path: PathBuf,
    /// Time between reconcile passes (`KEY_SYNC_INTERVAL_SECS`)
    pub interval: Duration,
    /// Bound on store provisioning/deletion waits (`KEY_SYNC_WAIT_TIMEOUT_SECS`)
    pub wait_timeout: Duration,
    /// Floor between store status polls (`KEY_SYNC_WAIT_MIN_INTERVAL_SECS`)
    pub wait_min_interval: Duration,
    /// Grace period before the first status poll (`KEY_SYNC_WAIT_DELAY_SECS`)
    pub wait_delay: Duration,
}

impl SyncConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let kvs_url = lookup("KVS_URL").unwrap_or_else(|| DEFAULT_KVS_URL.to_string());
        if !kvs_url.starts_with("http://") && !kvs_url.starts_with("https://") {
            return Err(ControllerError::InvalidConfig(format!(
                "KVS_URL must be an http(s) URL, got '{}'",
                kvs_url
            )));
        }

        let manifest_path = lookup("KEY_SYNC_MANIFEST")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                ControllerError::InvalidConfig(
                    "KEY_SYNC_MANIFEST environment variable is required".to_string(),
                )
            })?;

        let config = Self {
            kvs_url,
            manifest_path,
            interval: secs(&lookup, "KEY_SYNC_INTERVAL_SECS", DEFAULT_INTERVAL_SECS)?,
            wait_timeout: secs(&lookup, "KEY_SYNC_WAIT_TIMEOUT_SECS", DEFAULT_WAIT_TIMEOUT_SECS)?,
            wait_min_interval: secs(
                &lookup,
                "KEY_SYNC_WAIT_MIN_INTERVAL_SECS",
                DEFAULT_WAIT_MIN_INTERVAL_SECS,
            )?,
            wait_delay: secs(&lookup, "KEY_SYNC_WAIT_DELAY_SECS", DEFAULT_WAIT_DELAY_SECS)?,
        };

        if config.interval.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "KEY_SYNC_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        if config.wait_timeout.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "KEY_SYNC_WAIT_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }
}

fn secs<F>(lookup: &F, name: &str, default: u64) -> Result<Duration, ControllerError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| {
            ControllerError::InvalidConfig(format!(
                "{} must be a whole number of seconds, got '{}'",
                name, raw
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[("KEY_SYNC_MANIFEST", "/etc/key-sync/keys.yaml")])).unwrap();

        assert_eq!(config.kvs_url, "http://kvs:8080");
        assert_eq!(config.manifest_path, PathBuf::from("/etc/key-sync/keys.yaml"));
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.wait_timeout, Duration::from_secs(600));
        assert_eq!(config.wait_min_interval, Duration::from_secs(10));
        assert_eq!(config.wait_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("KVS_URL", "https://kvs.internal"),
            ("KEY_SYNC_MANIFEST", "keys.yaml"),
            ("KEY_SYNC_INTERVAL_SECS", "15"),
            ("KEY_SYNC_WAIT_TIMEOUT_SECS", " 120 "),
            ("KEY_SYNC_WAIT_MIN_INTERVAL_SECS", "1"),
            ("KEY_SYNC_WAIT_DELAY_SECS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.kvs_url, "https://kvs.internal");
        assert_eq!(config.interval, Duration::from_secs(15));
        assert_eq!(config.wait_timeout, Duration::from_secs(120));
        assert_eq!(config.wait_min_interval, Duration::from_secs(1));
        assert_eq!(config.wait_delay, Duration::ZERO);
    }

    #[test]
    fn test_manifest_is_required() {
        let err = SyncConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("KEY_SYNC_MANIFEST")));
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let err = SyncConfig::from_lookup(lookup(&[
            ("KEY_SYNC_MANIFEST", "keys.yaml"),
            ("KEY_SYNC_WAIT_TIMEOUT_SECS", "ten"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("KEY_SYNC_WAIT_TIMEOUT_SECS"));

        let err = SyncConfig::from_lookup(lookup(&[
            ("KEY_SYNC_MANIFEST", "keys.yaml"),
            ("KEY_SYNC_INTERVAL_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = SyncConfig::from_lookup(lookup(&[
            ("KVS_URL", "kvs:8080"),
            ("KEY_SYNC_MANIFEST", "keys.yaml"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
