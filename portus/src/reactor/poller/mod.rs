//! Platform I/O poller.
//!
//! The server core is Linux-only: readiness comes from `epoll`, zero-copy
//! delivery from `sendfile(2)`, and signals from `signalfd(2)`. The raw
//! syscall wrappers live in [`unix`].

pub(crate) mod common;
pub(crate) mod epoll;
pub(crate) mod unix;

pub(crate) use common::{Interest, Waker};

pub(crate) type Poller = epoll::EpollPoller;
