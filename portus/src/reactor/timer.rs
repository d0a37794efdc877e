//! Idle-timeout timer heap.
//!
//! A binary min-heap of `(deadline, id, generation)` entries. Adjusting a
//! timer never searches the heap: it pushes a fresh entry under a new
//! generation, and the superseded entry is skipped when it reaches the top.
//! At most one entry per id is *active* (matches the id's current
//! generation) at any time.
//!
//! The heap is driven by the dispatch thread only. Expiry callbacks must
//! not block or perform I/O; the server's callbacks only post a close notice.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

/// Callback invoked when a timer expires.
pub type TimeoutCallback = Box<dyn FnOnce() + Send + 'static>;

/// Stale entries tolerated before the heap is rebuilt from the active set.
const COMPACT_SLACK: usize = 64;

/// An entry in the timer heap.
struct TimerEntry {
    /// The time at which the timer should fire.
    deadline: Instant,

    /// Identifier of the timer owner (the connection's descriptor).
    id: u64,

    /// Generation this entry was pushed under.
    generation: u64,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Ord for TimerEntry {
    /// Orders entries by deadline.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// behaves as a min-heap, where the earliest deadline is popped first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Current state of a live timer.
struct Active {
    generation: u64,
    deadline: Instant,
    callback: TimeoutCallback,
}

/// A timer popped by [`TimerHeap::pop_expired`].
pub struct Expired {
    /// Identifier the timer was registered under.
    pub id: u64,

    callback: TimeoutCallback,
}

impl Expired {
    /// Runs the expiry callback.
    pub fn fire(self) {
        (self.callback)();
    }
}

impl fmt::Debug for Expired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expired").field("id", &self.id).finish()
    }
}

/// Min-heap of idle deadlines keyed by id.
#[derive(Default)]
pub struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    active: HashMap<u64, Active>,
    next_generation: u64,
}

impl TimerHeap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Arms a timer for `id` that fires `timeout` from now.
    ///
    /// An existing timer for the same id is replaced and its callback dropped.
    pub fn add<F>(&mut self, id: u64, timeout: Duration, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_at(id, Instant::now() + timeout, on_expire);
    }

    /// Arms a timer for `id` at an absolute deadline.
    pub fn add_at<F>(&mut self, id: u64, deadline: Instant, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.bump();

        self.active.insert(
            id,
            Active {
                generation,
                deadline,
                callback: Box::new(on_expire),
            },
        );
        self.push(id, deadline, generation);
    }

    /// Moves the deadline of `id` to `timeout` from now.
    ///
    /// Returns `false` if no timer is armed for `id`.
    pub fn adjust(&mut self, id: u64, timeout: Duration) -> bool {
        self.adjust_at(id, Instant::now() + timeout)
    }

    /// Moves the deadline of `id` to an absolute instant.
    pub fn adjust_at(&mut self, id: u64, deadline: Instant) -> bool {
        if !self.active.contains_key(&id) {
            return false;
        }

        let generation = self.bump();
        if let Some(active) = self.active.get_mut(&id) {
            active.generation = generation;
            active.deadline = deadline;
        }
        self.push(id, deadline, generation);

        true
    }

    /// Disarms the timer for `id` without running its callback.
    ///
    /// The heap entry stays behind and is dropped lazily.
    pub fn cancel(&mut self, id: u64) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Pops every active timer whose deadline is at or before `now`.
    ///
    /// Stale entries encountered on the way are discarded. The returned
    /// timers are no longer armed; running their callbacks is up to the caller.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<Expired> {
        let mut expired = Vec::new();

        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }

            let Some(entry) = self.heap.pop() else {
                break;
            };

            if !self.is_current(&entry) {
                continue;
            }

            if let Some(active) = self.active.remove(&entry.id) {
                expired.push(Expired {
                    id: entry.id,
                    callback: active.callback,
                });
            }
        }

        expired
    }

    /// Returns the time left until the earliest active deadline.
    ///
    /// `None` means no timer is armed and the poller may block indefinitely.
    pub fn next_deadline(&mut self, now: Instant) -> Option<Duration> {
        self.discard_stale();

        self.heap
            .peek()
            .map(|entry| entry.deadline.saturating_duration_since(now))
    }

    /// Returns the deadline currently armed for `id`.
    pub fn deadline_of(&self, id: u64) -> Option<Instant> {
        self.active.get(&id).map(|active| active.deadline)
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no timer is armed.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    fn is_current(&self, entry: &TimerEntry) -> bool {
        self.active
            .get(&entry.id)
            .is_some_and(|active| active.generation == entry.generation)
    }

    fn discard_stale(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.is_current(top) {
                break;
            }
            self.heap.pop();
        }
    }

    fn push(&mut self, id: u64, deadline: Instant, generation: u64) {
        self.heap.push(TimerEntry {
            deadline,
            id,
            generation,
        });

        if self.heap.len() > self.active.len() * 2 + COMPACT_SLACK {
            self.compact();
        }
    }

    /// Rebuilds the heap from the active set, dropping every stale entry.
    fn compact(&mut self) {
        self.heap = self
            .active
            .iter()
            .map(|(&id, active)| TimerEntry {
                deadline: active.deadline,
                id,
                generation: active.generation,
            })
            .collect();
    }
}
