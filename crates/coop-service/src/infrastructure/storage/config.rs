//! TOML configuration of the `cooperated` daemon.
//!
//! Reads and writes [`ServiceConfig`] at the platform-appropriate path:
//! - Windows:  `%APPDATA%\cooperate\config.toml`
//! - Linux:    `~/.config/cooperate/config.toml`
//! - macOS:    `~/Library/Application Support/cooperate/config.toml`
//!
//! Example:
//!
//! ```toml
//! [service]
//! log_level = "debug"
//! local_network_id = "3f2a9c0e5b7d4e1f8a6b2c9d0e1f2a3b"
//!
//! [network]
//! bind_address = "0.0.0.0"
//! listen_port = 52400
//!
//! [[network.peers]]
//! network_id = "9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a"
//! address = "192.168.1.20:52400"
//!
//! [cooperate]
//! handshake_timeout_ms = 3000
//!
//! [display]
//! width = 2560
//! height = 1440
//! ```
//!
//! Every field has a `#[serde(default = ...)]`, so a partial file (or none at
//! all) yields a usable configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use coop_core::{DisplayInfo, NetworkId};
use uuid::Uuid;

use crate::application::context::ContextOptions;
use crate::infrastructure::dsoftbus::TransportConfig;

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

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub cooperate: CooperateSection,
    #[serde(default)]
    pub display: DisplaySection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSection {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// This device's network id.  Generated when empty.
    #[serde(default)]
    pub local_network_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Where each known peer listens.
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerEntry {
    pub network_id: String,
    /// `host:port` of the peer's listener.
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CooperateSection {
    #[serde(default = "default_protocol_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_protocol_timeout_ms")]
    pub relay_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplaySection {
    #[serde(default = "default_width")]
    pub width: i32,
    #[serde(default = "default_height")]
    pub height: i32,
    /// Width in pixels of the hot-area band along each display edge.
    #[serde(default = "default_hot_area_margin")]
    pub hot_area_margin: i32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    52400
}
fn default_connect_timeout_ms() -> u64 {
    3000
}
fn default_protocol_timeout_ms() -> u64 {
    3000
}
fn default_width() -> i32 {
    1920
}
fn default_height() -> i32 {
    1080
}
fn default_hot_area_margin() -> i32 {
    100
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            local_network_id: String::new(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            listen_port: default_listen_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            peers: Vec::new(),
        }
    }
}

impl Default for CooperateSection {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_protocol_timeout_ms(),
            relay_timeout_ms: default_protocol_timeout_ms(),
        }
    }
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            hot_area_margin: default_hot_area_margin(),
        }
    }
}

impl ServiceConfig {
    /// Fills in a missing local network id.  Returns `true` when one was
    /// generated, so the caller can persist it.
    pub fn ensure_local_network_id(&mut self) -> bool {
        if !self.service.local_network_id.trim().is_empty() {
            return false;
        }
        self.service.local_network_id = Uuid::new_v4().simple().to_string();
        true
    }

    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            handshake_timeout_ms: self.cooperate.handshake_timeout_ms,
            relay_timeout_ms: self.cooperate.relay_timeout_ms,
            hot_area_margin: self.display.hot_area_margin,
        }
    }

    /// Listener address and peer table for the session transport.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            local: NetworkId::from(self.service.local_network_id.as_str()),
            bind_address: format!("{}:{}", self.network.bind_address, self.network.listen_port),
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms),
            peers: self
                .network
                .peers
                .iter()
                .map(|p| (NetworkId::from(p.network_id.as_str()), p.address.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    pub fn display_info(&self) -> DisplayInfo {
        DisplayInfo::new(self.display.width, self.display.height)
    }

    pub fn peer_ids(&self) -> Vec<NetworkId> {
        self.network
            .peers
            .iter()
            .map(|p| NetworkId::from(p.network_id.as_str()))
            .collect()
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

pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the configuration, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<ServiceConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

pub fn load_config_from(path: &Path) -> Result<ServiceConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServiceConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config`, creating the config directory when needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

pub fn save_config_to(config: &ServiceConfig, path: &Path) -> Result<(), ConfigError> {
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

/// Resolves the platform config directory, including the `cooperate` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("cooperate"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("cooperate"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("cooperate")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("coop_test_{}", Uuid::new_v4()))
            .join("config.toml")
    }

    #[test]
    fn test_service_config_default_values() {
        // Arrange / Act
        let cfg = ServiceConfig::default();

        // Assert
        assert_eq!(cfg.service.log_level, "info");
        assert_eq!(cfg.network.listen_port, 52400);
        assert_eq!(cfg.network.connect_timeout_ms, 3000);
        assert_eq!(cfg.cooperate.handshake_timeout_ms, 3000);
        assert_eq!(cfg.cooperate.relay_timeout_ms, 3000);
        assert_eq!((cfg.display.width, cfg.display.height), (1920, 1080));
        assert_eq!(cfg.display.hot_area_margin, 100);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: ServiceConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ServiceConfig::default());
    }

    #[test]
    fn test_partial_sections_keep_remaining_defaults() {
        // Arrange
        let toml_str = r#"
[network]
listen_port = 6000

[[network.peers]]
network_id = "peer-b"
address = "10.0.0.2:6000"

[cooperate]
relay_timeout_ms = 800
"#;

        // Act
        let cfg: ServiceConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.network.listen_port, 6000);
        assert_eq!(cfg.network.bind_address, "0.0.0.0");
        assert_eq!(cfg.network.peers.len(), 1);
        assert_eq!(cfg.network.peers[0].address, "10.0.0.2:6000");
        assert_eq!(cfg.cooperate.relay_timeout_ms, 800);
        assert_eq!(cfg.cooperate.handshake_timeout_ms, 3000);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        // Arrange
        let path = temp_path();
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "[[[ not valid toml").expect("write");

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(path.parent().expect("parent")).ok();
    }

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");
        let cfg = load_config_from(&path).expect("default config");
        assert_eq!(cfg, ServiceConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        // Arrange
        let path = temp_path();
        let mut cfg = ServiceConfig::default();
        cfg.service.log_level = "debug".to_string();
        cfg.network.peers.push(PeerEntry {
            network_id: "peer-b".to_string(),
            address: "127.0.0.1:52401".to_string(),
        });

        // Act
        save_config_to(&cfg, &path).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);
        std::fs::remove_dir_all(path.parent().expect("parent")).ok();
    }

    #[test]
    fn test_ensure_local_network_id_generates_once() {
        // Arrange
        let mut cfg = ServiceConfig::default();

        // Act
        let generated = cfg.ensure_local_network_id();
        let first = cfg.service.local_network_id.clone();
        let regenerated = cfg.ensure_local_network_id();

        // Assert
        assert!(generated);
        assert!(!regenerated);
        assert_eq!(first.len(), 32);
        assert_eq!(cfg.service.local_network_id, first);
    }

    #[test]
    fn test_context_options_follow_config() {
        let mut cfg = ServiceConfig::default();
        cfg.cooperate.handshake_timeout_ms = 1500;
        cfg.display.hot_area_margin = 40;
        let options = cfg.context_options();
        assert_eq!(options.handshake_timeout_ms, 1500);
        assert_eq!(options.relay_timeout_ms, 3000);
        assert_eq!(options.hot_area_margin, 40);
    }

    #[test]
    fn test_transport_config_joins_address_and_port() {
        // Arrange
        let mut cfg = ServiceConfig::default();
        cfg.service.local_network_id = "local-a".to_string();
        cfg.network.listen_port = 60000;
        cfg.network.peers.push(PeerEntry {
            network_id: "peer-b".to_string(),
            address: "10.0.0.2:60000".to_string(),
        });

        // Act
        let transport = cfg.transport_config();

        // Assert
        assert_eq!(transport.local, NetworkId::from("local-a"));
        assert_eq!(transport.bind_address, "0.0.0.0:60000");
        assert_eq!(transport.connect_timeout, Duration::from_millis(3000));
        assert_eq!(
            transport.peers.get(&NetworkId::from("peer-b")).map(String::as_str),
            Some("10.0.0.2:60000")
        );
        assert_eq!(cfg.peer_ids(), vec![NetworkId::from("peer-b")]);
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("cooperate/config.toml"), "got {path:?}");
        }
    }
}
