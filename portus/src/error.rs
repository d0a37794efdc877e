use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that prevent the server from starting or keep it from running.
///
/// Per-connection errors never surface here; they are resolved into a
/// response or a closed connection.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen on {addr}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to set up the poller")]
    Poller(#[source] io::Error),

    #[error("failed to set up signal handling")]
    Signal(#[source] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidOverride { key: &'static str, value: String },

    #[error("port {0} is reserved; use 0 or a port of at least 1024")]
    ReservedPort(u16),

    #[error("worker_threads must be at least 1")]
    NoWorkers,

    #[error("trigger_mode must be 0 to 3, got {0}")]
    TriggerMode(u8),

    #[error("invalid host {0:?}")]
    Host(String),
}
