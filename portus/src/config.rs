//! Server configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, the YAML
//! file named by `PORTUS_CONFIG`, and `PORTUS_*` environment variables.
//!
//! ```yaml
//! port: 1316
//! trigger_mode: 3
//! idle_timeout_ms: 60000
//! worker_threads: 6
//! resource_dir: ./resources
//! log:
//!   level: debug
//! ```

use crate::error::ConfigError;

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Environment variable naming the YAML config file.
pub const CONFIG_ENV: &str = "PORTUS_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub enabled: bool,

    /// `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// 0: level listener, level connections. 1: level listener, edge
    /// connections. 2: edge listener, level connections. 3: edge both.
    pub trigger_mode: u8,

    /// Idle eviction delay; 0 disables eviction.
    pub idle_timeout_ms: u64,

    /// Enable `SO_LINGER` on listening sockets.
    pub linger: bool,

    /// Also listen on the IPv6 wildcard address.
    pub ipv6: bool,

    pub worker_threads: usize,
    pub max_connections: usize,
    pub max_body_bytes: usize,

    pub resource_dir: PathBuf,
    pub data_dir: PathBuf,

    pub keep_alive_max: u32,
    pub keep_alive_timeout_s: u32,

    /// Handle SIGINT/SIGTERM as a shutdown request.
    pub handle_signals: bool,

    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 1316,
            trigger_mode: 3,
            idle_timeout_ms: 60_000,
            linger: true,
            ipv6: false,
            worker_threads: 6,
            max_connections: 65_536,
            max_body_bytes: 1 << 30,
            resource_dir: PathBuf::from("./resources"),
            data_dir: PathBuf::from("./data"),
            keep_alive_max: 6,
            keep_alive_timeout_s: 120,
            handle_signals: true,
            log: LogConfig::default(),
        }
    }
}

fn parse_override<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride { key, value })
}

impl ServerConfig {
    /// Loads the file named by `PORTUS_CONFIG` (if set), applies the
    /// environment overrides, and validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&text)
    }

    /// Parses YAML; missing keys keep their defaults.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Applies `PORTUS_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PORTUS_HOST") {
            self.host = value;
        }
        if let Some(value) = lookup("PORTUS_PORT") {
            self.port = parse_override("PORTUS_PORT", value)?;
        }
        if let Some(value) = lookup("PORTUS_TRIGGER_MODE") {
            self.trigger_mode = parse_override("PORTUS_TRIGGER_MODE", value)?;
        }
        if let Some(value) = lookup("PORTUS_TIMEOUT_MS") {
            self.idle_timeout_ms = parse_override("PORTUS_TIMEOUT_MS", value)?;
        }
        if let Some(value) = lookup("PORTUS_WORKERS") {
            self.worker_threads = parse_override("PORTUS_WORKERS", value)?;
        }
        if let Some(value) = lookup("PORTUS_RESOURCES") {
            self.resource_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("PORTUS_DATA") {
            self.data_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("PORTUS_LOG") {
            self.log.level = value;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port != 0 && self.port < 1024 {
            return Err(ConfigError::ReservedPort(self.port));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.trigger_mode > 3 {
            return Err(ConfigError::TriggerMode(self.trigger_mode));
        }
        self.listen_addr()?;

        Ok(())
    }

    /// Address of the primary listener.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = IpAddr::from_str(&self.host).map_err(|_| ConfigError::Host(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Whether the listening socket is edge-triggered.
    pub fn listen_edge(&self) -> bool {
        self.trigger_mode >= 2
    }

    /// Whether connection sockets are edge-triggered.
    pub fn conn_edge(&self) -> bool {
        self.trigger_mode == 1 || self.trigger_mode == 3
    }

    /// The idle timeout, or `None` when eviction is disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}
