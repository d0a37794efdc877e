//! The HTTP server: listeners, dispatch loop, and worker-side connection
//! tasks.

mod core;
mod handle;
mod listener;
mod signal;
mod slot;
mod task;

pub use self::core::Server;
pub use handle::ServerHandle;
pub use slot::InFlight;
