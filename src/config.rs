//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::game::{DEFAULT_TIME_FOR_ANSWER, DEFAULT_TIME_FOR_CHOICE, Settings};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_LIVE_BACK_CONFIG_PATH";

const DEFAULT_CLIENT_SEND_BUFFER: usize = 256;
const DEFAULT_PING_INTERVAL_MS: u64 = 5_000;
const DEFAULT_MAX_MESSAGE_BYTES: usize = 8_192;
const DEFAULT_PACKS_DIR: &str = "packs";
const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Time limits applied when a create request omits them.
    pub default_settings: Settings,
    /// Capacity of each socket's outbound queue.
    pub client_send_buffer: usize,
    /// Cadence of the JSON `PING` sent to every socket.
    pub ping_interval: Duration,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_bytes: usize,
    /// Directory holding `<pack_id>.json` files.
    pub packs_dir: PathBuf,
    /// Lifetime of cached session state.
    pub cache_ttl: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        packs_dir = %app_config.packs_dir.display(),
                        send_buffer = app_config.client_send_buffer,
                        "loaded configuration"
                    );
                    app_config
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
        }
    }

    /// Parse a configuration document. Missing fields take their default.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    default_time_for_answer: u64,
    default_time_for_choice: u64,
    client_send_buffer: usize,
    ping_interval_ms: u64,
    max_message_bytes: usize,
    packs_dir: PathBuf,
    cache_ttl_secs: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            default_time_for_answer: DEFAULT_TIME_FOR_ANSWER,
            default_time_for_choice: DEFAULT_TIME_FOR_CHOICE,
            client_send_buffer: DEFAULT_CLIENT_SEND_BUFFER,
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            packs_dir: PathBuf::from(DEFAULT_PACKS_DIR),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let mut default_settings = Settings {
            time_for_answer: value.default_time_for_answer,
            time_for_choice: value.default_time_for_choice,
        };
        if !default_settings.is_valid() {
            warn!(
                time_for_answer = value.default_time_for_answer,
                time_for_choice = value.default_time_for_choice,
                "configured default time limits out of range; using built-in limits"
            );
            default_settings = Settings::default();
        }

        Self {
            default_settings,
            // a zero-capacity channel cannot be built
            client_send_buffer: value.client_send_buffer.max(1),
            ping_interval: Duration::from_millis(value.ping_interval_ms.max(100)),
            max_message_bytes: value.max_message_bytes,
            packs_dir: value.packs_dir,
            cache_ttl: Duration::from_secs(value.cache_ttl_secs),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.default_settings, Settings::default());
        assert_eq!(config.client_send_buffer, 256);
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.cache_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn fields_override_defaults() {
        let config = AppConfig::from_json(
            r#"{"default_time_for_answer": 15, "client_send_buffer": 32, "packs_dir": "/srv/packs"}"#,
        )
        .unwrap();
        assert_eq!(config.default_settings.time_for_answer, 15);
        assert_eq!(config.default_settings.time_for_choice, 20);
        assert_eq!(config.client_send_buffer, 32);
        assert_eq!(config.packs_dir, PathBuf::from("/srv/packs"));
    }

    #[test]
    fn out_of_range_limits_fall_back() {
        let config = AppConfig::from_json(r#"{"default_time_for_choice": 0}"#).unwrap();
        assert_eq!(config.default_settings, Settings::default());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(AppConfig::from_json(r#"{"client_send_buffer": "many"}"#).is_err());
    }
}
