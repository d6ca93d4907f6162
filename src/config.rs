//! Application-level configuration loading: port, registry tunables and storage backend.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::services::registry_service::{
    DEFAULT_PERSIST_TIMEOUT, DEFAULT_STALE_THRESHOLD, RegistryConfig,
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/registry.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ROOM_REGISTRY_CONFIG_PATH";
/// Directory used by the file backend when nothing else is configured.
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_PORT: u16 = 8080;

/// Where the registry snapshot is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Keep the snapshot in process memory only.
    Memory,
    /// One JSON file per key inside `dir`.
    File {
        /// Directory holding the `<key>.json` files.
        dir: PathBuf,
    },
    /// A CouchDB database.
    #[serde(rename_all = "camelCase")]
    Couch {
        /// Server URL, e.g. `http://localhost:5984`.
        base_url: String,
        /// Database holding the registry documents.
        database: String,
        /// Basic-auth user; only used together with `password`.
        #[serde(default)]
        username: Option<String>,
        /// Basic-auth password; only used together with `username`.
        #[serde(default)]
        password: Option<String>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::File {
            dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// TCP port the HTTP server binds.
    pub port: u16,
    /// Registry tunables handed to the registry at construction.
    pub registry: RegistryConfig,
    /// Storage backend; `None` lets the binary pick from the environment.
    pub storage: Option<StorageConfig>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    ///
    /// `PORT` (or `SERVER_PORT`) overrides the configured port.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded registry config");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        if let Some(port) = port_from_env() {
            config.port = port;
        }
        config
    }

    /// Parse the JSON configuration format.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(raw).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            registry: RegistryConfig::default(),
            storage: None,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    port: Option<u16>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(default)]
    stale_threshold_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(default)]
    sweep_interval_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(default)]
    persist_timeout_ms: Option<Duration>,
    #[serde(default)]
    storage: Option<StorageConfig>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            port: value.port.unwrap_or(DEFAULT_PORT),
            registry: RegistryConfig {
                stale_threshold: value.stale_threshold_ms.unwrap_or(DEFAULT_STALE_THRESHOLD),
                sweep_interval: value.sweep_interval_ms.filter(|period| !period.is_zero()),
                persist_timeout: value.persist_timeout_ms.unwrap_or(DEFAULT_PERSIST_TIMEOUT),
                ..RegistryConfig::default()
            },
            storage: value.storage,
        }
    }
}

/// Pair CouchDB basic-auth settings. Half a pair is ignored with a warning.
pub fn couch_credentials(
    username: Option<String>,
    password: Option<String>,
) -> Option<(String, String)> {
    match (username, password) {
        (Some(username), Some(password)) => Some((username, password)),
        (Some(_), None) => {
            warn!("CouchDB username configured without a password; connecting without credentials");
            None
        }
        (None, Some(_)) => {
            warn!("CouchDB password configured without a username; connecting without credentials");
            None
        }
        (None, None) => None,
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn port_from_env() -> Option<u16> {
    env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = AppConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.registry.stale_threshold, Duration::from_millis(300_000));
        assert_eq!(config.registry.sweep_interval, None);
    }

    #[test]
    fn durations_are_milliseconds() {
        let config = AppConfig::from_json_str(
            r#"{"port":9000,"staleThresholdMs":60000,"sweepIntervalMs":15000,"persistTimeoutMs":500}"#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.registry.stale_threshold, Duration::from_secs(60));
        assert_eq!(config.registry.sweep_interval, Some(Duration::from_secs(15)));
        assert_eq!(config.registry.persist_timeout, Duration::from_millis(500));
    }

    #[test]
    fn zero_sweep_interval_disables_sweeping() {
        let config = AppConfig::from_json_str(r#"{"sweepIntervalMs":0}"#).unwrap();
        assert_eq!(config.registry.sweep_interval, None);
    }

    #[test]
    fn storage_variants_parse() {
        let memory = AppConfig::from_json_str(r#"{"storage":{"kind":"memory"}}"#).unwrap();
        assert_eq!(memory.storage, Some(StorageConfig::Memory));

        let file =
            AppConfig::from_json_str(r#"{"storage":{"kind":"file","dir":"/var/lib/rooms"}}"#)
                .unwrap();
        assert_eq!(
            file.storage,
            Some(StorageConfig::File {
                dir: PathBuf::from("/var/lib/rooms")
            })
        );

        let couch = AppConfig::from_json_str(
            r#"{"storage":{"kind":"couch","baseUrl":"http://couch:5984","database":"rooms"}}"#,
        )
        .unwrap();
        assert_eq!(
            couch.storage,
            Some(StorageConfig::Couch {
                base_url: "http://couch:5984".into(),
                database: "rooms".into(),
                username: None,
                password: None,
            })
        );
    }

    #[test]
    fn couch_credentials_need_both_halves() {
        assert_eq!(
            couch_credentials(Some("admin".into()), Some("secret".into())),
            Some(("admin".to_string(), "secret".to_string()))
        );
        assert_eq!(couch_credentials(Some("admin".into()), None), None);
        assert_eq!(couch_credentials(None, Some("secret".into())), None);
        assert_eq!(couch_credentials(None, None), None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(AppConfig::from_json_str(r#"{"staleThreshold":5}"#).is_err());
    }
}
