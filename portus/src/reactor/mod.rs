//! Readiness reactor primitives.
//!
//! This module provides the pieces the dispatch loop is built from:
//! - the `epoll` poller and its raw syscall wrappers,
//! - the idle-timeout [`TimerHeap`],
//! - the notice channel workers use to reach the dispatch thread.
//!
//! The dispatch loop itself lives in [`crate::server`].

pub(crate) mod event;
pub(crate) mod notice;
pub(crate) mod poller;
pub mod timer;

pub use notice::{Notice, NoticeSender};
pub use timer::{Expired, TimerHeap};
