//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, SunnyConfig};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Name used for the config directories and the local file.
pub const APP_NAME: &str = "sunny";

/// The three places a config file may live, lowest precedence first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocations {
    pub system: PathBuf,
    pub user: Option<PathBuf>,
    /// Relative to the working directory unless built with [`new`](Self::new).
    pub local: PathBuf,
}

impl ConfigLocations {
    /// `/etc/<app>/config.toml`, `<config dir>/<app>/config.toml` and
    /// `./<app>.toml`. The user directory follows `XDG_CONFIG_HOME`.
    pub fn for_app(app: &str) -> Self {
        let user_dir = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf());
        Self::new(app, Path::new("/etc"), user_dir.as_deref(), Path::new("."))
    }

    /// Same layout rooted at explicit directories.
    pub fn new(app: &str, system_dir: &Path, user_dir: Option<&Path>, local_dir: &Path) -> Self {
        let nested = Path::new(app).join("config.toml");
        Self {
            system: system_dir.join(&nested),
            user: user_dir.map(|d| d.join(&nested)),
            local: local_dir.join(format!("{}.toml", app)),
        }
    }

    /// Files that exist, in load order. An existing `cli_path` takes the
    /// place of the local file.
    pub fn existing(&self, cli_path: Option<&Path>) -> Vec<PathBuf> {
        let local = match cli_path {
            Some(path) if path.exists() => path,
            _ => self.local.as_path(),
        };
        [Some(self.system.as_path()), self.user.as_deref(), Some(local)]
            .into_iter()
            .flatten()
            .filter(|p| p.exists())
            .map(Path::to_path_buf)
            .collect()
    }
}

/// Discover config files in standard locations.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, with `cli_path` replacing the local file when it
/// exists.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    ConfigLocations::for_app(APP_NAME).existing(cli_path)
}

/// Read one file as a raw table, checking it deserialises on its own so
/// type errors name the file they came from.
pub fn load_from_file(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    let parse_error = |e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let table: toml::Table = contents.parse().map_err(parse_error)?;
    toml::Value::Table(table.clone())
        .try_into::<SunnyConfig>()
        .map_err(parse_error)?;
    Ok(table)
}

/// Recursively merge `overlay` into `base`. Tables merge key by key; any
/// other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Load and merge `files` in order over the compiled defaults.
pub fn load_files(files: &[PathBuf]) -> Result<(SunnyConfig, ConfigSources), ConfigError> {
    let mut sources = ConfigSources::default();
    let mut merged = toml::Table::new();

    for path in files {
        merge_tables(&mut merged, load_from_file(path)?);
        sources.files.push(path.clone());
    }

    let config = toml::Value::Table(merged)
        .try_into::<SunnyConfig>()
        .map_err(|e| ConfigError::Parse {
            path: files.last().cloned().unwrap_or_default(),
            message: e.to_string(),
        })?;

    Ok((config, sources))
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut SunnyConfig, sources: &mut ConfigSources) {
    apply_overrides(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Values that do not parse for their field are skipped and not recorded.
pub fn apply_overrides(
    config: &mut SunnyConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let mut overlay = |key: &'static str, apply: &mut dyn FnMut(String) -> bool| {
        if let Some(v) = lookup(key) {
            if apply(v) {
                sources.env_overrides.push(key.to_string());
            }
        }
    };

    // Legacy name first so SUNNY_HOST wins when both are set
    overlay("SUNNY_ABLETON_HOST", &mut |v: String| {
        config.link.host = v;
        true
    });
    overlay("SUNNY_HOST", &mut |v: String| {
        config.link.host = v;
        true
    });
    overlay("SUNNY_TRANSPORT", &mut |v: String| set_parsed(&mut config.link.transport, &v));
    overlay("SUNNY_STREAM_PORT", &mut |v: String| set_parsed(&mut config.link.stream_port, &v));
    overlay("SUNNY_DATAGRAM_PORT", &mut |v: String| {
        set_parsed(&mut config.link.datagram_port, &v)
    });
    overlay("SUNNY_DATAGRAM_BIND_PORT", &mut |v: String| {
        set_parsed(&mut config.link.datagram_bind_port, &v)
    });
    overlay("SUNNY_CONNECT_TIMEOUT_MS", &mut |v: String| {
        set_parsed(&mut config.link.connect_timeout_ms, &v)
    });
    overlay("SUNNY_RETRY_DELAY_MS", &mut |v: String| {
        set_parsed(&mut config.link.retry_delay_ms, &v)
    });
    overlay("SUNNY_MAX_RETRY_DELAY_MS", &mut |v: String| {
        set_parsed(&mut config.link.max_retry_delay_ms, &v)
    });
    overlay("SUNNY_REQUEST_TIMEOUT_MS", &mut |v: String| {
        set_parsed(&mut config.requests.timeout_ms, &v)
    });

    overlay("SUNNY_LOG_LEVEL", &mut |v: String| {
        config.telemetry.log_level = v;
        true
    });
    // RUST_LOG wins over SUNNY_LOG_LEVEL
    overlay("RUST_LOG", &mut |v: String| {
        config.telemetry.log_level = v;
        true
    });
}

fn set_parsed<T: FromStr>(slot: &mut T, raw: &str) -> bool {
    match raw.trim().parse() {
        Ok(value) => {
            *slot = value;
            true
        }
        Err(_) => false,
    }
}
