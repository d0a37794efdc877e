use crate::error::ServerError;
use crate::reactor::poller::unix::{
    domain_of, sys_accept, sys_bind, sys_close, sys_listen, sys_set_linger, sys_set_reuseaddr,
    sys_set_v6only, sys_sockname, sys_socket,
};

use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;

/// Pending-connection queue length passed to `listen(2)`.
const BACKLOG: i32 = 128;

/// A bound, listening, non-blocking TCP socket.
#[derive(Debug)]
pub(crate) struct Listener {
    fd: RawFd,
    addr: SocketAddr,
}

impl Listener {
    /// Binds and listens on `addr`.
    ///
    /// `v6only` only applies to IPv6 addresses. The socket is closed again if
    /// any step fails.
    pub(crate) fn bind(addr: SocketAddr, linger: bool, v6only: bool) -> Result<Self, ServerError> {
        let fd = sys_socket(domain_of(&addr))?;
        let mut listener = Self { fd, addr };

        if linger {
            sys_set_linger(fd, true)?;
        }
        sys_set_reuseaddr(fd)?;
        if addr.is_ipv6() {
            sys_set_v6only(fd, v6only)?;
        }

        sys_bind(fd, &addr).map_err(|source| ServerError::Bind { addr, source })?;
        sys_listen(fd, BACKLOG).map_err(|source| ServerError::Listen { addr, source })?;

        listener.addr = sys_sockname(fd)?;
        Ok(listener)
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accepts one pending connection as a non-blocking socket.
    pub(crate) fn accept(&self) -> io::Result<(RawFd, SocketAddr)> {
        sys_accept(self.fd)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        sys_close(self.fd);
    }
}
