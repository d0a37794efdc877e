use super::injector::{Injector, Task};
use super::worker::Worker;

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Fixed-size thread pool with an unbounded FIFO task queue.
///
/// `submit` never blocks the caller. Each submitted task runs exactly once,
/// or not at all when it is submitted after shutdown began.
pub struct WorkerPool {
    /// Queue shared by all workers.
    injector: Arc<Injector>,

    /// Join handles for worker threads.
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` workers.
    ///
    /// Fails if the OS refuses to create a thread; workers spawned before
    /// the failure are shut down and joined.
    pub fn new(threads: usize) -> io::Result<Self> {
        let injector = Arc::new(Injector::new());
        let mut pool = Self {
            injector: injector.clone(),
            handles: Vec::with_capacity(threads),
        };

        for id in 0..threads {
            let worker = Worker::new(id, injector.clone());

            let handle = thread::Builder::new()
                .name(format!("portus-worker-{id}"))
                .spawn(move || worker.run())?;

            pool.handles.push(handle);
        }

        Ok(pool)
    }

    /// Returns a builder for configuring the pool.
    pub fn builder() -> WorkerPoolBuilder {
        WorkerPoolBuilder::new()
    }

    /// Queues a task for execution on some worker.
    ///
    /// Returns `false` when the pool is shutting down; the task is dropped
    /// without running.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(task) as Task)
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    /// Number of tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.injector.len()
    }

    /// Stops accepting tasks and wakes all workers so they drain and exit.
    pub fn shutdown(&self) {
        self.injector.shutdown();
    }

    /// Waits for all worker threads to terminate.
    ///
    /// This should be called after initiating shutdown.
    pub fn join(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
        self.join();
    }
}

/// Builder for a [`WorkerPool`].
///
/// ```rust,ignore
/// let pool = WorkerPool::builder().worker_threads(4).build()?;
/// ```
pub struct WorkerPoolBuilder {
    worker_threads: usize,
}

impl WorkerPoolBuilder {
    /// Defaults to the number of available logical CPUs, falling back to `1`.
    pub fn new() -> Self {
        let worker_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self { worker_threads }
    }

    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.worker_threads = n;
        self
    }

    pub fn build(self) -> io::Result<WorkerPool> {
        WorkerPool::new(self.worker_threads)
    }
}

impl Default for WorkerPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
