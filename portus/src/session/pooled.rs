use super::{CredentialStore, SessionBackend, new_token};
use crate::pool::{Manage, Pooled, ResourcePool};

use std::io;
use std::time::Duration;

use tracing::warn;

/// How long an operation waits for a free backend by default.
const DEFAULT_CHECKOUT_WAIT: Duration = Duration::from_millis(500);

/// [`CredentialStore`] backed by a pool of backend connections.
///
/// Each operation checks one connection out for its duration. Backend
/// failures and pool exhaustion are logged and reported as a negative
/// answer.
pub struct PooledStore<M: Manage> {
    pool: ResourcePool<M>,
    checkout_wait: Duration,
}

impl<M> PooledStore<M>
where
    M: Manage,
    M::Resource: SessionBackend,
{
    pub fn new(pool: ResourcePool<M>) -> Self {
        Self {
            pool,
            checkout_wait: DEFAULT_CHECKOUT_WAIT,
        }
    }

    /// Opens a pool of `size` connections through `manager`.
    pub fn open(manager: M, size: usize) -> io::Result<Self> {
        Ok(Self::new(ResourcePool::new(manager, size)?))
    }

    pub fn checkout_wait(mut self, wait: Duration) -> Self {
        self.checkout_wait = wait;
        self
    }

    pub fn pool(&self) -> &ResourcePool<M> {
        &self.pool
    }

    fn with_backend<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Pooled<'_, M>) -> io::Result<T>,
    ) -> Option<T> {
        let Some(mut backend) = self.pool.checkout_timeout(self.checkout_wait) else {
            warn!(operation, "no session backend available");
            return None;
        };

        match f(&mut backend) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(operation, error = %e, "session backend failure");
                None
            }
        }
    }
}

impl<M> CredentialStore for PooledStore<M>
where
    M: Manage,
    M::Resource: SessionBackend,
{
    fn verify(&self, identity: &str, secret: &str) -> bool {
        if identity.is_empty() || secret.is_empty() {
            return false;
        }

        self.with_backend("verify", |backend| backend.secret_of(identity))
            .flatten()
            .is_some_and(|stored| stored == secret)
    }

    fn create(&self, identity: &str, secret: &str) -> bool {
        if identity.is_empty() || secret.is_empty() {
            return false;
        }

        self.with_backend("create", |backend| {
            backend.insert_identity(identity, secret)
        })
        .unwrap_or(false)
    }

    fn issue_session(&self, identity: &str) -> Option<String> {
        self.with_backend("issue_session", |backend| {
            let token = new_token()?;
            backend.put_session(&token, identity)?;
            Ok(token)
        })
    }

    fn revoke(&self, token: &str) -> bool {
        self.with_backend("revoke", |backend| backend.remove_session(token))
            .unwrap_or(false)
    }

    fn lookup(&self, token: &str) -> Option<String> {
        self.with_backend("lookup", |backend| backend.session_owner(token))
            .flatten()
    }
}
