//! Credential and session storage.
//!
//! [`CredentialStore`] is the capability the session gate consumes.
//! [`PooledStore`] implements it over a [`ResourcePool`](crate::pool::ResourcePool)
//! of [`SessionBackend`] connections, and [`MemoryManager`] provides an
//! in-process backend.

mod memory;
mod pooled;

pub use memory::{MemoryBackend, MemoryManager};
pub use pooled::PooledStore;

use crate::reactor::poller::unix::sys_getrandom;

use std::fmt::Write;
use std::io;

/// Identity and session operations, keyed by opaque token.
pub trait CredentialStore: Send + Sync {
    /// Whether `secret` is the secret registered for `identity`.
    fn verify(&self, identity: &str, secret: &str) -> bool;

    /// Registers a new identity. `false` if it already exists or is empty.
    fn create(&self, identity: &str, secret: &str) -> bool;

    /// Opens a session for `identity` and returns its token.
    fn issue_session(&self, identity: &str) -> Option<String>;

    /// Ends the session behind `token`. `false` if there was none.
    fn revoke(&self, token: &str) -> bool;

    /// Identity owning the session behind `token`.
    fn lookup(&self, token: &str) -> Option<String>;
}

/// One connection to an identity and session store.
pub trait SessionBackend: Send {
    fn secret_of(&mut self, identity: &str) -> io::Result<Option<String>>;

    /// Inserts an identity; `Ok(false)` when it already exists.
    fn insert_identity(&mut self, identity: &str, secret: &str) -> io::Result<bool>;

    fn put_session(&mut self, token: &str, identity: &str) -> io::Result<()>;

    /// Removes a session; `Ok(false)` when it did not exist.
    fn remove_session(&mut self, token: &str) -> io::Result<bool>;

    fn session_owner(&mut self, token: &str) -> io::Result<Option<String>>;
}

/// Generates a 128-bit random session token, hex-encoded.
pub fn new_token() -> io::Result<String> {
    let mut bytes = [0u8; 16];
    sys_getrandom(&mut bytes)?;

    let mut token = String::with_capacity(32);
    for byte in bytes {
        let _ = write!(token, "{byte:02x}");
    }

    Ok(token)
}
