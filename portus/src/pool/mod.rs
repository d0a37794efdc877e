//! Thread and resource pools.
//!
//! - [`WorkerPool`] runs request processing off the dispatch thread.
//! - [`ResourcePool`] hands out long-lived backend resources through a
//!   scoped [`Pooled`] guard.

mod core;
mod injector;
mod worker;

pub mod resource;

pub use self::core::{WorkerPool, WorkerPoolBuilder};
pub use injector::Task;
pub use resource::{Manage, Pooled, ResourcePool};
