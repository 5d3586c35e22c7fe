//! Configuration module for the telemetry gateway
//!
//! Configuration is a single TOML document. Every field has a default, so
//! an empty file (or no file at all) yields a working gateway listening on
//! `0.0.0.0:5005` with the demo key.
//!
//! # Location
//!
//! The file is looked up in this order:
//!
//! 1. The path in the `TELEMETRY_GATEWAY_CONFIG` environment variable
//! 2. `gateway.toml` in the platform config directory under `dev.telemetry-gateway`:
//!    - **Linux**: `~/.config/dev.telemetry-gateway/`
//!    - **macOS**: `~/Library/Application Support/dev.telemetry-gateway/`
//!    - **Windows**: `%APPDATA%\dev.telemetry-gateway\`
//!
//! If neither exists, defaults are used.
//!
//! # Example
//!
//! ```toml
//! [network]
//! listen_addr = "0.0.0.0:5005"
//!
//! [crypto]
//! key = "0123456789abcdef"
//!
//! [scoring]
//! alpha = 0.05
//!
//! [workers]
//! count = 4
//! ```

use crate::codec::DEMO_KEY;
use crate::error::{GatewayError, Result};
use crate::scorer::{validate_alpha, DEFAULT_ALPHA};
use crate::store::DEFAULT_HISTORY_CAPACITY;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Application identifier for config and data directories
pub const APP_ID: &str = "dev.telemetry-gateway";

/// Config filename inside the config directory
pub const CONFIG_FILE: &str = "gateway.toml";

/// Environment variable overriding the config path
pub const CONFIG_ENV_VAR: &str = "TELEMETRY_GATEWAY_CONFIG";

/// Default UDP listen port
pub const DEFAULT_PORT: u16 = 5005;

/// Largest accepted datagram, in bytes
pub const DEFAULT_MAX_DATAGRAM: usize = 4096;

/// Largest payload a UDP datagram can carry over IPv4
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Default reading log filename
pub const DEFAULT_DATABASE_FILE: &str = "gateway_data.db";

// ==================== Directories ====================

/// Platform config directory for the gateway
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Platform data directory for the gateway
pub fn data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Resolve the config file path: env override first, then the config dir
pub fn config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .or_else(|| config_dir().map(|p| p.join(CONFIG_FILE)))
}

// ==================== Gateway Config ====================

/// Complete gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub network: NetworkConfig,
    pub crypto: CryptoConfig,
    pub scoring: ScoringConfig,
    pub store: StoreConfig,
    pub persistence: PersistenceConfig,
    pub workers: WorkerConfig,
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Load from the resolved config path, or defaults if there is no file
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load gateway config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Load and validate a config file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            GatewayError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GatewayError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| GatewayError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            GatewayError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Check invariants the rest of the gateway relies on
    pub fn validate(&self) -> Result<()> {
        validate_alpha(self.scoring.alpha)?;
        if !matches!(self.crypto.key.len(), 16 | 24 | 32) {
            return Err(GatewayError::Config(format!(
                "crypto.key must be 16, 24 or 32 bytes, got {}",
                self.crypto.key.len()
            )));
        }
        if self.store.history_capacity == 0 {
            return Err(GatewayError::Config(
                "store.history_capacity must be at least 1".to_string(),
            ));
        }
        if self.network.max_datagram == 0 || self.network.max_datagram > MAX_UDP_PAYLOAD {
            return Err(GatewayError::Config(format!(
                "network.max_datagram must be in 1..={}, got {}",
                MAX_UDP_PAYLOAD, self.network.max_datagram
            )));
        }
        if self.workers.count > 0 && self.workers.queue_capacity == 0 {
            return Err(GatewayError::Config(
                "workers.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ==================== Sections ====================

/// UDP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the gateway binds to
    pub listen_addr: SocketAddr,

    /// Receive buffer size; longer datagrams are truncated and then rejected
    pub max_datagram: usize,

    /// How often the receive loop wakes to check for shutdown, in milliseconds
    pub recv_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_datagram: DEFAULT_MAX_DATAGRAM,
            recv_timeout_ms: 250,
        }
    }
}

/// Wire cipher settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Shared symmetric key (16, 24 or 32 bytes of text)
    pub key: String,
}

impl CryptoConfig {
    /// Key bytes as used by the codec
    pub fn key_bytes(&self) -> &[u8] {
        self.key.as_bytes()
    }
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("key", &format_args!("<{} bytes>", self.key.len()))
            .finish()
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key: String::from_utf8_lossy(DEMO_KEY).into_owned(),
        }
    }
}

/// Gateway-side scoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// EMA smoothing factor for gateway-side scorers
    pub alpha: f64,

    /// Score samples that arrive without an anomaly_score
    pub score_missing: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            score_missing: true,
        }
    }
}

/// In-memory state settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Samples retained per node
    pub history_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Reading log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Whether accepted readings are written to the log
    pub enabled: bool,

    /// Log location; defaults to `gateway_data.db` in the data directory
    pub database_path: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: None,
        }
    }
}

impl PersistenceConfig {
    /// Effective log path
    pub fn resolved_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_DATABASE_FILE)
        })
    }
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of node-keyed workers; 0 processes inline on the receive thread
    pub count: usize,

    /// Per-worker queue length
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 0,
            queue_capacity: 1024,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files; stdout only when unset
    pub directory: Option<PathBuf>,
}
