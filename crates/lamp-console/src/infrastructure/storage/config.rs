//! TOML configuration for the lamp console.
//!
//! Read from the platform-appropriate config file unless `--config` names
//! another one:
//! - Windows:  `%APPDATA%\LampConsole\config.toml`
//! - Linux:    `~/.config/lamp-console/config.toml`
//! - macOS:    `~/Library/Application Support/LampConsole/config.toml`
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! baud_rate = 9600
//! read_timeout_ms = 100
//!
//! [console]
//! log_level = "info"
//! connect_on_start = true
//! ```
//!
//! Every field is optional.  Values given on the command line (or through
//! the `LAMP_*` environment variables) override the file.

use std::path::{Path, PathBuf};

use lamp_core::protocol::DEFAULT_BAUD_RATE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
}

/// Serial link settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialConfig {
    /// Device to open by default; `None` means `connect` needs an argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout in milliseconds.  Also bounds how long a disconnect waits.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Terminal behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Connect to `serial.port` right after start-up.
    #[serde(default)]
    pub connect_on_start: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            connect_on_start: false,
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory cannot
/// be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the default location.
///
/// Without a platform config directory there is nothing to read, so the
/// defaults are returned.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    match config_file_path() {
        Ok(path) => load_config_from(&path),
        Err(ConfigError::NoPlatformConfigDir) => Ok(AppConfig::default()),
        Err(e) => Err(e),
    }
}

/// Loads the config at `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Resolves the platform config directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LampConsole"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("lamp-console"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LampConsole")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
