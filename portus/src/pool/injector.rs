use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

/// A unit of work handed to the pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared task queue feeding the worker threads.
///
/// Workers park on a condition variable while the queue is empty and are
/// woken one at a time by [`Injector::push`], or all at once by
/// [`Injector::shutdown`].
pub(crate) struct Injector {
    /// Pending tasks in submission order.
    queue: Mutex<VecDeque<Task>>,

    /// Signalled when a task is pushed or shutdown begins.
    not_empty: Condvar,

    /// Set once the pool stops accepting tasks.
    shutdown: AtomicBool,
}

impl Injector {
    pub(crate) fn new() -> Self {
        Injector {
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Stops accepting tasks and wakes every parked worker.
    ///
    /// Tasks already queued are still handed out; workers exit once the
    /// queue is empty.
    pub(crate) fn shutdown(&self) {
        // Taking the lock orders the flag store against a worker that has
        // checked the flag but not yet started waiting.
        let _queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        self.shutdown.store(true, Ordering::Release);
        self.not_empty.notify_all();
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Queues a task. Returns `false`, dropping the task, after shutdown.
    pub(crate) fn push(&self, task: Task) -> bool {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);

        if self.is_shutdown() {
            return false;
        }

        queue.push_back(task);
        self.not_empty.notify_one();
        true
    }

    /// Takes the next task, parking while the queue is empty.
    ///
    /// Returns `None` once shutdown has begun and the queue is drained.
    pub(crate) fn pop(&self) -> Option<Task> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if let Some(task) = queue.pop_front() {
                return Some(task);
            }

            if self.is_shutdown() {
                return None;
            }

            queue = self
                .not_empty
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Number of queued tasks.
    pub(crate) fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
