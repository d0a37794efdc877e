use super::core::Shared;
use crate::reactor::Notice;

use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Cloneable control handle for a running [`Server`](super::Server).
#[derive(Clone)]
pub struct ServerHandle {
    pub(crate) shared: Arc<Shared>,
}

impl ServerHandle {
    /// Asks the dispatch loop to stop.
    ///
    /// The loop notices on its next wake-up, closes every connection, and
    /// joins the workers before [`Server::run`](super::Server::run) returns.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let _ = self.shared.notices.post(Notice::Shutdown);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Number of currently registered connections.
    pub fn live_connections(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }
}
