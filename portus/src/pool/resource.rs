//! Generic fixed-size resource pool.
//!
//! A [`ResourcePool`] is filled once at construction through its [`Manage`]
//! implementation. Callers borrow resources through the [`Pooled`] guard,
//! which returns the resource to the pool on every exit path: normal return,
//! early return, or unwinding.

use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::warn;

/// Lifecycle capability for pooled resources.
///
/// Call sites depend only on this trait, never on a concrete backend.
pub trait Manage: Send + Sync {
    /// The pooled resource.
    type Resource: Send;

    /// Opens a new resource.
    fn open(&self) -> io::Result<Self::Resource>;

    /// Releases a resource permanently.
    fn close(&self, resource: Self::Resource) {
        drop(resource);
    }

    /// Whether a returned resource may be handed out again.
    fn is_healthy(&self, _resource: &Self::Resource) -> bool {
        true
    }
}

/// Fixed-size pool of resources opened by `M`.
pub struct ResourcePool<M: Manage> {
    manager: M,
    idle: Mutex<Vec<M::Resource>>,
    available: Condvar,
    size: usize,
}

impl<M: Manage> ResourcePool<M> {
    /// Opens `size` resources up front.
    ///
    /// Fails if `size` is zero or any resource fails to open; resources
    /// opened before the failure are closed.
    pub fn new(manager: M, size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "resource pool size must be at least 1",
            ));
        }

        let mut idle = Vec::with_capacity(size);
        for _ in 0..size {
            match manager.open() {
                Ok(resource) => idle.push(resource),
                Err(e) => {
                    for resource in idle.drain(..) {
                        manager.close(resource);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            manager,
            idle: Mutex::new(idle),
            available: Condvar::new(),
            size,
        })
    }

    /// Configured number of resources.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Resources currently checked in.
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Takes a resource without waiting. `None` when all are checked out.
    pub fn checkout(&self) -> Option<Pooled<'_, M>> {
        let resource = self.lock().pop();

        match resource {
            Some(resource) => Some(Pooled::new(self, resource)),
            None => {
                warn!(size = self.size, "resource pool exhausted");
                None
            }
        }
    }

    /// Takes a resource, waiting up to `timeout` for one to be returned.
    pub fn checkout_timeout(&self, timeout: Duration) -> Option<Pooled<'_, M>> {
        let deadline = Instant::now() + timeout;
        let mut idle = self.lock();

        loop {
            if let Some(resource) = idle.pop() {
                return Some(Pooled::new(self, resource));
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            let (guard, _) = self
                .available
                .wait_timeout(idle, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            idle = guard;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<M::Resource>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, resource: M::Resource) {
        let resource = if self.manager.is_healthy(&resource) {
            resource
        } else {
            self.manager.close(resource);

            match self.manager.open() {
                Ok(fresh) => fresh,
                Err(e) => {
                    warn!(error = %e, "failed to reopen pooled resource");
                    return;
                }
            }
        };

        self.lock().push(resource);
        self.available.notify_one();
    }
}

impl<M: Manage> Drop for ResourcePool<M> {
    fn drop(&mut self) {
        let idle = std::mem::take(self.idle.get_mut().unwrap_or_else(PoisonError::into_inner));
        for resource in idle {
            self.manager.close(resource);
        }
    }
}

/// Scoped checkout of a pooled resource.
///
/// Dereferences to the resource and hands it back to the pool on drop.
pub struct Pooled<'a, M: Manage> {
    pool: &'a ResourcePool<M>,
    resource: Option<M::Resource>,
}

impl<'a, M: Manage> Pooled<'a, M> {
    fn new(pool: &'a ResourcePool<M>, resource: M::Resource) -> Self {
        Self {
            pool,
            resource: Some(resource),
        }
    }
}

impl<M: Manage> Deref for Pooled<'_, M> {
    type Target = M::Resource;

    fn deref(&self) -> &Self::Target {
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource taken before drop"),
        }
    }
}

impl<M: Manage> DerefMut for Pooled<'_, M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource taken before drop"),
        }
    }
}

impl<M: Manage> Drop for Pooled<'_, M> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.release(resource);
        }
    }
}
