//! Configuration loading and data root resolution
//!
//! Bootstrap configuration comes from a single TOML file. Every field has a
//! built-in default, so a missing file only produces a warning.
//!
//! # Resolution priority
//!
//! Config file path:
//! 1. Command-line argument (highest priority)
//! 2. `QHOST_CONFIG` environment variable
//! 3. `~/.config/qhost/config.toml`, then `/etc/qhost/config.toml`
//! 4. Built-in defaults (no file)
//!
//! Data root:
//! 1. Command-line argument
//! 2. `QHOST_DATA_ROOT` environment variable
//! 3. `data_root` key of the TOML file
//! 4. OS-dependent compiled default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "QHOST_CONFIG";

/// Environment variable naming the data root
pub const DATA_ROOT_ENV_VAR: &str = "QHOST_DATA_ROOT";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Listen address for the HTTP server
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Root folder of the tick data store (optional)
    #[serde(default)]
    pub data_root: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub legacy: LegacyConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server limits
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Maximum accepted request body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Routing tags used for translated legacy requests
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyConfig {
    /// Data source tag (a sub-folder of the data root)
    #[serde(default = "default_tag")]
    pub source: String,

    /// Client interface dialect the response is rendered in
    #[serde(default = "default_tag")]
    pub interface: String,
}

/// Data backend settings
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Upper bound for a single validate or fetch call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_tag() -> String {
    "av".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_root: None,
            server: ServerConfig::default(),
            legacy: LegacyConfig::default(),
            backend: BackendConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            source: default_tag(),
            interface: default_tag(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load configuration from the resolved path, falling back to defaults
    ///
    /// An explicitly requested file (CLI or env) that cannot be read is an
    /// error. A missing file at one of the well-known locations is not.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_config_path(cli_arg) {
            info!("Loading configuration from {}", path.display());
            return Self::load(&path)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)));
        }

        match well_known_config_path() {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            None => {
                warn!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.legacy.source.trim().is_empty() {
            return Err(Error::Config("legacy.source must not be empty".to_string()));
        }
        if self.legacy.interface.trim().is_empty() {
            return Err(Error::Config("legacy.interface must not be empty".to_string()));
        }
        if self.backend.timeout_ms == 0 {
            return Err(Error::Config("backend.timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

fn explicit_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }
    std::env::var(CONFIG_ENV_VAR)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Get the first existing config file at a well-known location
fn well_known_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("qhost").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/qhost/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Resolve the data root following CLI > env > TOML > OS default
pub fn resolve_data_root(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATA_ROOT_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.data_root {
        return path.clone();
    }

    get_default_data_root()
}

/// Get OS-dependent default data root
pub fn get_default_data_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("qhost").join("tickdata"))
        .unwrap_or_else(|| PathBuf::from("./qhost_data/tickdata"))
}
