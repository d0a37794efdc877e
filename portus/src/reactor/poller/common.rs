use std::os::fd::RawFd;

/// Readiness interest for a registered descriptor.
///
/// `edge` selects edge-triggered delivery and `oneshot` disarms the
/// descriptor after the first event until it is explicitly re-armed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
    pub(crate) edge: bool,
    pub(crate) oneshot: bool,
}

impl Interest {
    pub(crate) const fn readable() -> Self {
        Self {
            read: true,
            write: false,
            edge: false,
            oneshot: false,
        }
    }

    pub(crate) const fn writable() -> Self {
        Self {
            read: false,
            write: true,
            edge: false,
            oneshot: false,
        }
    }

    pub(crate) const fn edge(mut self, edge: bool) -> Self {
        self.edge = edge;
        self
    }

    pub(crate) const fn oneshot(mut self, oneshot: bool) -> Self {
        self.oneshot = oneshot;
        self
    }
}

/// The poller's wake-up `eventfd`.
///
/// Handles on other threads keep the descriptor alive through an `Arc`, so
/// it is closed only when the last of them is dropped.
pub(crate) struct Waker(pub(crate) RawFd);

impl Drop for Waker {
    fn drop(&mut self) {
        super::unix::sys_close(self.0);
    }
}

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}
