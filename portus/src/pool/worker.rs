use super::injector::Injector;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, trace};

/// A worker thread of the pool.
///
/// The worker repeatedly takes a task from the shared injector and runs it
/// to completion. A panicking task is logged and contained so the thread
/// stays available for the next task.
pub(crate) struct Worker {
    /// Worker identifier, used in thread names and diagnostics.
    id: usize,

    /// Shared task queue.
    injector: Arc<Injector>,
}

impl Worker {
    pub(crate) fn new(id: usize, injector: Arc<Injector>) -> Self {
        Self { id, injector }
    }

    /// Runs the worker loop until the injector is shut down and drained.
    pub(crate) fn run(&self) {
        trace!(worker = self.id, "worker started");

        while let Some(task) = self.injector.pop() {
            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                error!(worker = self.id, "task panicked");
            }
        }

        trace!(worker = self.id, "worker exiting");
    }
}
