//! TOML-based configuration for an AwareLink node.
//!
//! Reads and writes `AwareLinkConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\AwareLink\config.toml`
//! - Linux:    `~/.config/awarelink/config.toml`
//! - macOS:    `~/Library/Application Support/AwareLink/config.toml`
//!
//! Example:
//!
//! ```toml
//! [discovery]
//! service_name = "COMMANDER_SERVICE"
//!
//! [network]
//! passphrase = "somePassword"
//! negotiation_timeout_secs = 30
//! listen_address = "::"
//!
//! [node]
//! name = "handheld"
//! log_level = "info"
//! ```
//!
//! Every field has a serde default, so an empty or partial file is valid and
//! a missing file yields [`AwareLinkConfig::default`].

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use awarelink_core::MachineSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

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

    /// `listen_address` is not an IP address.
    #[error("invalid listen address '{0}'")]
    InvalidListenAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level node configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AwareLinkConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub node: NodeConfig,
}

/// Discovery session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// Service name shared by publishers and subscribers.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

/// Data-path negotiation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Pre-shared passphrase placed in every network request.
    #[serde(default = "default_passphrase")]
    pub passphrase: String,
    /// Seconds a connection attempt may stay unresolved.  `0` waits forever.
    #[serde(default = "default_negotiation_timeout_secs")]
    pub negotiation_timeout_secs: u64,
    /// Address the server-side listening socket binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

/// Identity and logging for this node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default = "default_node_name")]
    pub name: String,
    #[serde(default = "Uuid::new_v4")]
    pub node_id: Uuid,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_service_name() -> String {
    "COMMANDER_SERVICE".to_string()
}
fn default_passphrase() -> String {
    "somePassword".to_string()
}
fn default_negotiation_timeout_secs() -> u64 {
    30
}
fn default_listen_address() -> String {
    "::".to_string()
}
fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "awarelink-node".to_string())
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            passphrase: default_passphrase(),
            negotiation_timeout_secs: default_negotiation_timeout_secs(),
            listen_address: default_listen_address(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            node_id: Uuid::new_v4(),
            log_level: default_log_level(),
        }
    }
}

impl AwareLinkConfig {
    /// Settings for the link state machine.
    pub fn machine_settings(&self) -> MachineSettings {
        let timeout = match self.network.negotiation_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        MachineSettings {
            service_name: self.discovery.service_name.clone(),
            passphrase: self.network.passphrase.clone(),
            negotiation_timeout: timeout,
        }
    }

    /// Parsed `listen_address`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidListenAddress`] if it is not an IP address.
    pub fn listen_address(&self) -> Result<IpAddr, ConfigError> {
        self.network
            .listen_address
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddress(self.network.listen_address.clone()))
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

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform path, or defaults if it does not exist.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AwareLinkConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config from `path`, returning defaults if the file does not
/// exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AwareLinkConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AwareLinkConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform path.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &AwareLinkConfig) -> Result<PathBuf, ConfigError> {
    let path = config_file_path()?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AwareLinkConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("AwareLink"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("awarelink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("AwareLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
