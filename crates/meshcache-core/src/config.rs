//! Configuration system for meshcache.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MESHCACHE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/meshcache/config.toml
//!   3. ~/.config/meshcache/config.toml
//!
//! The listening port is deliberately NOT configuration — it is the one
//! CLI argument, so several nodes on one host can share a config file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub network: NetworkConfig,
    pub cache: CacheConfig,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Multicast group for presence announcements.
    pub multicast_group: String,
    /// Multicast port for presence announcements.
    pub multicast_port: u16,
    /// Timeout for each outbound connect (peer or origin).
    pub connect_timeout_ms: u64,
    /// Timeout for reading an outbound response to completion.
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding one flat body file per cached URL.
    pub storage_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// First self-announcement interval.
    pub initial_interval_ms: u64,
    /// Upper bound on the self-announcement interval.
    pub max_interval_ms: u64,
    /// Multiplier applied to the interval after every send.
    pub backoff_factor: u32,
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl DiscoveryConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            cache: CacheConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            multicast_group: crate::wire::GROUP_ADDR.to_string(),
            multicast_port: crate::wire::GROUP_PORT,
            connect_timeout_ms: 3_000,
            read_timeout_ms: 10_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            storage_path: data_dir().join("bodies"),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            max_interval_ms: 3_600_000, // 1 hour
            backoff_factor: 3,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("meshcache")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("meshcache")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MeshConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            MeshConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MESHCACHE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&MeshConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply MESHCACHE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MESHCACHE_NETWORK__MULTICAST_GROUP") {
            self.network.multicast_group = v;
        }
        if let Ok(v) = std::env::var("MESHCACHE_NETWORK__MULTICAST_PORT") {
            if let Ok(p) = v.parse() {
                self.network.multicast_port = p;
            }
        }
        if let Ok(v) = std::env::var("MESHCACHE_NETWORK__CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.network.connect_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("MESHCACHE_NETWORK__READ_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.network.read_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("MESHCACHE_CACHE__STORAGE_PATH") {
            self.cache.storage_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MESHCACHE_DISCOVERY__INITIAL_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.discovery.initial_interval_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("MESHCACHE_DISCOVERY__MAX_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.discovery.max_interval_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("MESHCACHE_DISCOVERY__BACKOFF_FACTOR") {
            if let Ok(f) = v.parse() {
                self.discovery.backoff_factor = f;
            }
        }
    }
}
