//! TOML-based configuration for the session coordinator.
//!
//! Reads `AppConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\VmSession\config.toml`
//! - Linux:    `~/.config/vmsession/config.toml`
//! - macOS:    `~/Library/Application Support/VmSession/config.toml`
//!
//! or from an explicit path given on the command line.
//!
//! ```toml
//! [session]
//! log_level = "debug"
//! terminal_namespace = "vmsession"
//! terminate_grace_ms = 1000
//! restored_from_snapshot = false
//!
//! [machine]
//! monitor_count = 2
//! serial_port_count = 1
//! ```
//!
//! Every field carries a `#[serde(default = "...")]`, so a missing file, a
//! missing section, or an older file with fewer keys all load cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vmsession_core::MachineLayout;

use crate::application::coordinator::{
    CoordinatorConfig, DEFAULT_TERMINAL_NAMESPACE, DEFAULT_TERMINATE_GRACE,
};

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

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub machine: MachineConfig,
}

/// Coordinator behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Serial ports must be named `<terminal_namespace>.terminal.<index>`.
    #[serde(default = "default_terminal_namespace")]
    pub terminal_namespace: String,
    /// Power-down delay between backgrounding the host and exiting it.
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
    /// The VM instance was started from a saved state.  Pausing such an
    /// instance does not save state again.
    #[serde(default)]
    pub restored_from_snapshot: bool,
}

/// Static VM configuration that device indices are validated against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineConfig {
    #[serde(default = "default_one")]
    pub monitor_count: u32,
    #[serde(default = "default_one")]
    pub serial_port_count: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_terminal_namespace() -> String {
    DEFAULT_TERMINAL_NAMESPACE.to_string()
}
fn default_terminate_grace_ms() -> u64 {
    DEFAULT_TERMINATE_GRACE.as_millis() as u64
}
fn default_one() -> u32 {
    1
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            terminal_namespace: default_terminal_namespace(),
            terminate_grace_ms: default_terminate_grace_ms(),
            restored_from_snapshot: false,
        }
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            monitor_count: default_one(),
            serial_port_count: default_one(),
        }
    }
}

impl AppConfig {
    /// Builds the coordinator parameters described by this file.
    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            layout: MachineLayout {
                monitor_count: self.machine.monitor_count,
                serial_port_count: self.machine.serial_port_count,
            },
            restored_from_snapshot: self.session.restored_from_snapshot,
            terminal_namespace: self.session.terminal_namespace.clone(),
            terminate_grace: Duration::from_millis(self.session.terminate_grace_ms),
        }
    }

    /// Renders the config as TOML, e.g. for `--print-config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
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

/// Loads `AppConfig` from the default location, returning
/// `AppConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Resolves the platform config base directory including the `VmSession` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("VmSession"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("vmsession"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("VmSession")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
