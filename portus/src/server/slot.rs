use std::sync::atomic::{AtomicU8, Ordering};

const CLAIMED: u8 = 0b01;
const CLOSING: u8 = 0b10;

/// Per-connection dispatch guard.
///
/// The dispatch thread claims it before handing the connection to a worker,
/// and the worker releases it just before re-arming the descriptor. A
/// readiness event that finds it claimed is dropped, so at most one task per
/// connection is ever queued or running.
///
/// Teardown marks the guard closing instead of waiting on a busy worker.
/// Once closing, the guard can no longer be claimed, and the worker that
/// releases it learns it must hand the connection back for closing rather
/// than re-arm it.
#[derive(Debug, Default)]
pub struct InFlight(AtomicU8);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the guard. `false` if a task already holds it or the
    /// connection is closing.
    pub fn try_claim(&self) -> bool {
        self.0
            .compare_exchange(0, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the claim. Returns `true` when a close was requested while
    /// it was held.
    pub fn release(&self) -> bool {
        self.0.fetch_and(!CLAIMED, Ordering::AcqRel) & CLOSING != 0
    }

    /// Marks the connection closing. Returns `true` if a task held the
    /// claim at that moment; its [`release`](Self::release) will then
    /// report the close.
    pub fn request_close(&self) -> bool {
        self.0.fetch_or(CLOSING, Ordering::AcqRel) & CLAIMED != 0
    }

    pub fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire) & CLAIMED != 0
    }

    pub fn is_closing(&self) -> bool {
        self.0.load(Ordering::Acquire) & CLOSING != 0
    }
}
