//! # Portus
//!
//! An `epoll`-driven HTTP/1.1 server core for Linux.
//!
//! One dispatch thread multiplexes readiness and idle timeouts; a fixed
//! pool of worker threads reads, parses, resolves, and writes. Static
//! files are served from memory mappings and attachments with `sendfile`,
//! with partial writes resumed on the next writable event.
//!
//! ```rust,ignore
//! use portus::{ServerConfig, Server, StaticResolver};
//! use std::sync::Arc;
//!
//! let config = ServerConfig::load()?;
//! let resolver = StaticResolver::new(&config.resource_dir, &config.data_dir);
//! let mut server = Server::new(config, Arc::new(resolver))?;
//! server.run()?;
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod pool;
pub mod reactor;
pub mod resolve;
pub mod server;
pub mod session;

pub use buffer::ByteBuffer;
pub use config::{LogConfig, ServerConfig};
pub use error::{ConfigError, ServerError};
pub use resolve::{Resolve, ResolvedAction, SessionResolver, StaticResolver};
pub use server::{Server, ServerHandle};
