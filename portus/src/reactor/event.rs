/// An I/O event reported by the poller.
///
/// The reactor checks `hangup` before `readable` and `writable`: a peer
/// that went away is torn down without attempting further I/O.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Event {
    /// Token associated with the registered file descriptor.
    pub(crate) token: u64,

    /// The descriptor is readable.
    pub(crate) readable: bool,

    /// The descriptor is writable.
    pub(crate) writable: bool,

    /// The peer closed its half, or the descriptor is in an error state.
    pub(crate) hangup: bool,
}
