use super::core::Shared;
use super::slot::InFlight;
use crate::http::{Connection, ReadStatus, WriteStatus};
use crate::reactor::poller::Interest;

use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

/// One read or write pass over a connection, run on a worker thread.
///
/// Every path ends in either re-arming the descriptor or posting a close
/// notice to the dispatch thread. The in-flight guard is released first in
/// both cases.
pub(crate) struct ConnTask {
    pub(crate) shared: Arc<Shared>,
    pub(crate) conn: Arc<Mutex<Connection>>,
    pub(crate) flight: Arc<InFlight>,
    pub(crate) fd: RawFd,
    pub(crate) serial: u64,
}

impl ConnTask {
    pub(crate) fn on_read(self) {
        let cell = Arc::clone(&self.conn);
        let mut conn = cell.lock().unwrap_or_else(PoisonError::into_inner);

        if conn.is_closed() {
            let _ = self.flight.release();
            return;
        }

        match conn.read() {
            Ok(ReadStatus::Open(_)) => self.process(conn),
            Ok(ReadStatus::PeerClosed) => {
                debug!(fd = self.fd, "peer closed");
                self.close(conn);
            }
            Err(e) => {
                debug!(fd = self.fd, error = %e, "read failed");
                self.close(conn);
            }
        }
    }

    pub(crate) fn on_write(self) {
        let cell = Arc::clone(&self.conn);
        let mut conn = cell.lock().unwrap_or_else(PoisonError::into_inner);

        if conn.is_closed() {
            let _ = self.flight.release();
            return;
        }

        match conn.write() {
            Ok(WriteStatus::Done) if conn.keep_alive() => self.process(conn),
            Ok(WriteStatus::Done) => self.close(conn),
            Ok(WriteStatus::Pending) => self.rearm(conn, Interest::writable()),
            Err(e) => {
                debug!(fd = self.fd, error = %e, "write failed");
                self.close(conn);
            }
        }
    }

    /// Parses what is buffered and waits for the next direction.
    fn process(self, mut conn: MutexGuard<'_, Connection>) {
        let ready = conn.advance(&*self.shared.resolver, &self.shared.builder);

        let interest = if ready {
            Interest::writable()
        } else {
            Interest::readable()
        };
        self.rearm(conn, interest);
    }

    /// Releases the guard, then re-arms while still holding the connection
    /// so a concurrent teardown cannot close the descriptor in between.
    ///
    /// A close requested while the task ran wins over re-arming.
    fn rearm(self, conn: MutexGuard<'_, Connection>, interest: Interest) {
        let interest = interest.edge(self.shared.conn_edge).oneshot(true);

        if self.flight.release() {
            debug!(fd = self.fd, "close requested during task");
            drop(conn);
            self.shared.notices.close(self.fd, self.serial);
            return;
        }

        if let Err(e) = self
            .shared
            .poller
            .reregister(self.fd, self.fd as u64, interest)
        {
            warn!(fd = self.fd, error = %e, "failed to re-arm connection");
            drop(conn);
            self.shared.notices.close(self.fd, self.serial);
        }
    }

    fn close(self, conn: MutexGuard<'_, Connection>) {
        let _ = self.flight.release();
        drop(conn);
        self.shared.notices.close(self.fd, self.serial);
    }
}
