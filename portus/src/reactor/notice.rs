use super::poller::Waker;

use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, SendError, Sender, channel};

/// Message posted to the dispatch thread.
///
/// Only the dispatch thread tears connections down. Workers and timer
/// callbacks that decide a connection must close post a [`Notice::Close`]
/// instead of touching the connection table themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    /// Close the connection on `fd` if it still carries `serial`.
    ///
    /// The serial guards against a descriptor number that was closed and
    /// reused by a newer connection before the notice was drained.
    Close { fd: RawFd, serial: u64 },

    /// Stop the dispatch loop.
    Shutdown,
}

/// Cloneable sending side of the notice channel.
///
/// Every post wakes the poller so the notice is drained promptly.
#[derive(Clone)]
pub struct NoticeSender {
    sender: Sender<Notice>,
    waker: Arc<Waker>,
}

impl NoticeSender {
    pub(crate) fn new(sender: Sender<Notice>, waker: Arc<Waker>) -> Self {
        Self { sender, waker }
    }

    /// Posts a notice and wakes the dispatch thread.
    ///
    /// Fails only once the dispatch thread has exited.
    pub fn post(&self, notice: Notice) -> Result<(), SendError<Notice>> {
        self.sender.send(notice)?;
        self.waker.wake();
        Ok(())
    }

    /// Requests the close of `(fd, serial)`.
    ///
    /// A post after the dispatch thread has exited is dropped: teardown of
    /// the whole table already closed the descriptor.
    pub fn close(&self, fd: RawFd, serial: u64) {
        let _ = self.post(Notice::Close { fd, serial });
    }
}

/// Creates the notice channel bound to a poller waker.
pub(crate) fn notice_channel(waker: Arc<Waker>) -> (NoticeSender, Receiver<Notice>) {
    let (sender, receiver) = channel();
    (NoticeSender::new(sender, waker), receiver)
}
