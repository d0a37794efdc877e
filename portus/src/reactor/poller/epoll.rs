//! Linux `epoll`-based poller implementation.
//!
//! Responsibilities:
//! - Register file descriptors with read/write interests, level- or
//!   edge-triggered, optionally one-shot
//! - Re-arm one-shot descriptors from any thread
//! - Block waiting for I/O readiness with a timer-driven timeout
//! - Wake the dispatch thread when another thread posts a notice
//!
//! `epoll_ctl` is thread-safe, so every method except [`EpollPoller::poll`]
//! only needs a shared reference; worker threads re-arm their connection
//! through an `Arc<EpollPoller>`.

use super::common::Interest;
use super::unix::{sys_close, sys_eventfd};
use crate::reactor::event::Event;
use crate::reactor::poller::Waker;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLET, EPOLLHUP,
    EPOLLIN, EPOLLONESHOT, EPOLLOUT, EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event,
    epoll_wait,
};
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Reserved token used internally for the wake-up event.
///
/// File descriptors are non-negative `i32`s, so this never collides with
/// a descriptor token.
pub(crate) const WAKE_TOKEN: u64 = u64::MAX;

/// Maximum number of events collected by a single `epoll_wait`.
const MAX_EVENTS: usize = 1024;

/// Linux `epoll` poller.
///
/// This poller owns:
/// - an `epoll` instance,
/// - an internal `eventfd` used as a wake-up signal.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Waker wrapping the internal eventfd.
    waker: Arc<Waker>,
}

unsafe impl Send for EpollPoller {}
unsafe impl Sync for EpollPoller {}

impl Waker {
    /// Wake the poller.
    ///
    /// This writes to the internal `eventfd`, causing `epoll_wait`
    /// to return immediately.
    pub(crate) fn wake(&self) {
        let buf: u64 = 1;
        unsafe {
            libc::write(self.0, &buf as *const _ as *const _, 8);
        }
    }
}

fn flags_of(interest: Interest) -> u32 {
    let mut flags = EPOLLRDHUP;

    if interest.read {
        flags |= EPOLLIN;
    }
    if interest.write {
        flags |= EPOLLOUT;
    }
    if interest.edge {
        flags |= EPOLLET;
    }
    if interest.oneshot {
        flags |= EPOLLONESHOT;
    }

    flags as u32
}

impl EpollPoller {
    /// Create a new `EpollPoller`.
    ///
    /// This:
    /// - creates the epoll instance,
    /// - creates a non-blocking `eventfd`,
    /// - registers the eventfd into epoll as a persistent wake source.
    pub(crate) fn new() -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let eventfd = match sys_eventfd() {
            Ok(fd) => fd,
            Err(e) => {
                sys_close(epoll);
                return Err(e);
            }
        };

        let poller = Self {
            epoll,
            waker: Arc::new(Waker(eventfd)),
        };

        poller.ctl(EPOLL_CTL_ADD, eventfd, EPOLLIN as u32, WAKE_TOKEN)?;

        Ok(poller)
    }

    /// Return the poller waker.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    fn ctl(&self, op: i32, fd: RawFd, flags: u32, token: u64) -> io::Result<()> {
        let mut event = epoll_event {
            events: flags,
            u64: token,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Register a file descriptor with the poller.
    ///
    /// A failure here is fatal for `fd`; the caller is expected to close it.
    pub(crate) fn register(&self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, flags_of(interest), token)
    }

    /// Update interest flags for an already registered descriptor.
    ///
    /// For one-shot descriptors this is the re-arm operation.
    pub(crate) fn reregister(&self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, flags_of(interest), token)
    }

    /// Remove a file descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) {
        unsafe {
            epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut());
        }
    }

    /// Poll for I/O readiness events.
    ///
    /// Blocks until:
    /// - at least one file descriptor becomes ready,
    /// - the wake event is triggered,
    /// - or the optional timeout expires (`None` blocks indefinitely).
    ///
    /// An interrupted wait returns `Ok` with no events. The wake event is
    /// consumed here and reported as a single event carrying [`WAKE_TOKEN`].
    pub(crate) fn poll(
        &self,
        raw: &mut Vec<epoll_event>,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        // Round up so a sub-millisecond deadline does not spin.
        let timeout_ms = timeout
            .map(|t| t.as_micros().div_ceil(1000).min(i32::MAX as u128) as i32)
            .unwrap_or(-1);

        if raw.capacity() < MAX_EVENTS {
            raw.reserve(MAX_EVENTS - raw.len());
        }

        events.clear();

        let n = unsafe {
            epoll_wait(
                self.epoll,
                raw.as_mut_ptr(),
                raw.capacity() as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            raw.set_len(n as usize);
        }

        for ev in raw.iter() {
            let token = ev.u64;
            let flags = ev.events;

            if token == WAKE_TOKEN {
                let mut buf = 0u64;
                unsafe {
                    libc::read(self.waker.0, &mut buf as *mut _ as *mut _, 8);
                }
            }

            events.push(Event {
                token,
                readable: flags & (EPOLLIN as u32) != 0,
                writable: flags & (EPOLLOUT as u32) != 0,
                hangup: flags & ((EPOLLRDHUP | EPOLLHUP | EPOLLERR) as u32) != 0,
            });
        }

        raw.clear();

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        sys_close(self.epoll);
    }
}
