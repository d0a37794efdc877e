use crate::reactor::poller::unix::{sys_close, sys_read_signal, sys_signalfd};

use std::io;
use std::os::fd::RawFd;

/// A `signalfd` receiving SIGINT and SIGTERM.
///
/// Creating it blocks both signals for the calling thread, and threads
/// spawned afterwards inherit the mask.
#[derive(Debug)]
pub(crate) struct SignalFd(RawFd);

impl SignalFd {
    pub(crate) fn new() -> io::Result<Self> {
        sys_signalfd(&[libc::SIGINT, libc::SIGTERM]).map(Self)
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.0
    }

    /// Reads the next pending signal number.
    pub(crate) fn read(&self) -> Option<u32> {
        sys_read_signal(self.0)
    }
}

impl Drop for SignalFd {
    fn drop(&mut self) {
        sys_close(self.0);
    }
}
