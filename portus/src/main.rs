use portus::session::{MemoryManager, PooledStore};
use portus::{Server, ServerConfig, SessionResolver, StaticResolver, logging};

use std::sync::Arc;

use anyhow::{Context, Result};

/// Session backend connections kept open.
const SESSION_POOL_SIZE: usize = 8;

fn main() -> Result<()> {
    let config = ServerConfig::load().context("failed to load configuration")?;
    logging::init(&config.log);

    let store = PooledStore::open(MemoryManager::new(), SESSION_POOL_SIZE)
        .context("failed to open session store")?;
    let resolver = SessionResolver::new(
        StaticResolver::new(&config.resource_dir, &config.data_dir),
        store,
    );

    let mut server = Server::new(config, Arc::new(resolver)).context("failed to start server")?;
    server.run().context("server terminated")?;

    Ok(())
}
