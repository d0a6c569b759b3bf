//! Configuration loading for the Sunny bridge tools.
//!
//! The core crates never read files or the environment; they take a
//! [`sunlink::TransportConfig`] from their caller. This crate is how the
//! binary builds one.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/sunny/config.toml` (system)
//! 2. `~/.config/sunny/config.toml` (user)
//! 3. `./sunny.toml` (local override, or the path given with `--config`)
//! 4. Environment variables (`SUNNY_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [link]
//! transport = "stream"
//! host = "127.0.0.1"
//! stream_port = 9001
//! datagram_port = 9002
//! retry_delay_ms = 1000
//!
//! [requests]
//! timeout_ms = 5000
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigLocations, ConfigSources, APP_NAME};
pub use sections::{LinkConfig, RequestConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Complete configuration for the bridge tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SunnyConfig {
    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub requests: RequestConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl SunnyConfig {
    /// Load configuration from the standard locations plus the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Like [`load`](Self::load), with `config_path` replacing `./sunny.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(config_path);
        let (mut config, mut sources) = loader::load_files(&files)?;
        loader::apply_env_overrides(&mut config, &mut sources);
        Ok((config, sources))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.requests.timeout_ms)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string_pretty(self)?;
        Ok(format!("# Sunny Configuration\n\n{}", body))
    }
}
