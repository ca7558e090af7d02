//! File and environment configuration for the `signal_map` binary.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use signal_map_live::LiveConfig;
use signal_map_loader::LoaderConfig;
use signal_map_source::api::SignalApiConfig;

/// Overrides `[api] base_url`.
pub const API_URL_ENV: &str = "SIGNAL_MAP_API_URL";
/// Overrides `[live] url`.
pub const WS_URL_ENV: &str = "SIGNAL_MAP_WS_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// All settings, one TOML section per component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: SignalApiConfig,
    pub live: LiveConfig,
    pub loader: LoaderConfig,
}

impl AppConfig {
    /// Reads `path` (or starts from defaults) and applies environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(WS_URL_ENV).ok(),
        );

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        log::debug!("Loaded config from {}", path.display());

        toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_overrides(&mut self, api_url: Option<String>, ws_url: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api.base_url = url;
        }
        if let Some(url) = ws_url.filter(|u| !u.trim().is_empty()) {
            self.live.url = url;
        }
    }
}
