use libc::{
    AF_INET, AF_INET6, F_GETFL, F_SETFL, IPPROTO_IPV6, IPV6_V6ONLY, MAP_FAILED, MAP_PRIVATE,
    MSG_NOSIGNAL, O_NONBLOCK, PROT_READ, SFD_CLOEXEC, SFD_NONBLOCK, SIG_BLOCK, SIG_IGN, SIGPIPE,
    SO_LINGER, SO_REUSEADDR, SOCK_CLOEXEC, SOCK_NONBLOCK, SOCK_STREAM, SOL_SOCKET, accept4, bind,
    c_int, c_void, close, fcntl, getsockname, iovec, linger, listen, mmap, munmap, off_t, readv,
    send, sendfile, setsockopt, sigaddset, sigemptyset, signalfd, signalfd_siginfo, sigset_t,
    sockaddr, sockaddr_in, sockaddr_in6, sockaddr_storage, socket, socklen_t, writev,
};
use std::io::{IoSlice, IoSliceMut};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::RawFd;
use std::{io, mem, ptr};

/// Converts a raw syscall return value into an `io::Result`.
fn cvt(rc: isize) -> io::Result<usize> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Scatter-reads from a file descriptor into the given slices.
///
/// The file descriptor **must** be non-blocking; `WouldBlock` is returned
/// when no data is available.
pub(crate) fn sys_readv(fd: RawFd, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize> {
    // IoSliceMut is ABI compatible with iovec on unix.
    let rc = unsafe { readv(fd, bufs.as_mut_ptr() as *const iovec, bufs.len() as c_int) };
    cvt(rc)
}

/// Gather-writes the given slices to a file descriptor.
pub(crate) fn sys_writev(fd: RawFd, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
    let rc = unsafe { writev(fd, bufs.as_ptr() as *const iovec, bufs.len() as c_int) };
    cvt(rc)
}

/// Transfers up to `count` bytes of `file` starting at `*offset` to `socket`.
///
/// The kernel advances `offset` by the number of bytes sent.
pub(crate) fn sys_sendfile(
    socket: RawFd,
    file: RawFd,
    offset: &mut u64,
    count: usize,
) -> io::Result<usize> {
    let mut off = *offset as off_t;
    let rc = unsafe { sendfile(socket, file, &mut off, count) };
    let sent = cvt(rc)?;
    *offset = off as u64;

    Ok(sent)
}

/// Sends a best-effort message on a socket without raising `SIGPIPE`.
pub(crate) fn sys_send(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    let rc = unsafe { send(fd, buffer.as_ptr() as *const c_void, buffer.len(), MSG_NOSIGNAL) };
    cvt(rc)
}

/// Closes a file descriptor.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { close(fd) };
}

/// Sets a file descriptor to non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Creates a non-blocking stream socket.
pub(crate) fn sys_socket(domain: c_int) -> io::Result<RawFd> {
    let fd = unsafe { socket(domain, SOCK_STREAM | SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    if let Err(e) = sys_set_nonblocking(fd) {
        unsafe { close(fd) };
        return Err(e);
    }

    Ok(fd)
}

/// Binds a socket to an address.
pub(crate) fn sys_bind(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);

    let rc = unsafe { bind(fd, &storage as *const _ as *const sockaddr, len) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Marks a socket as a listening socket.
pub(crate) fn sys_listen(fd: RawFd, backlog: c_int) -> io::Result<()> {
    let rc = unsafe { listen(fd, backlog) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Accepts a new incoming connection.
///
/// The returned client socket is automatically set to non-blocking mode.
pub(crate) fn sys_accept(fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    // Flags are applied atomically so a concurrent fork never inherits the
    // descriptor.
    let client_fd = unsafe {
        accept4(
            fd,
            &mut storage as *mut _ as *mut sockaddr,
            &mut len,
            SOCK_NONBLOCK | SOCK_CLOEXEC,
        )
    };

    if client_fd < 0 {
        return Err(io::Error::last_os_error());
    }

    match sockaddr_storage_to_socketaddr(&storage) {
        Ok(addr) => Ok((client_fd, addr)),
        Err(e) => {
            unsafe { close(client_fd) };
            Err(e)
        }
    }
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let rc = unsafe { getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        sockaddr_storage_to_socketaddr(&storage)
    }
}

fn set_option<T>(fd: RawFd, level: c_int, name: c_int, value: &T) -> io::Result<()> {
    let rc = unsafe {
        setsockopt(
            fd,
            level,
            name,
            value as *const T as *const c_void,
            mem::size_of::<T>() as socklen_t,
        )
    };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Enables `SO_REUSEADDR` on a socket.
pub(crate) fn sys_set_reuseaddr(fd: RawFd) -> io::Result<()> {
    let yes: c_int = 1;
    set_option(fd, SOL_SOCKET, SO_REUSEADDR, &yes)
}

/// Configures `SO_LINGER`.
///
/// When enabled, `close` waits up to one second for unsent data to drain.
pub(crate) fn sys_set_linger(fd: RawFd, enabled: bool) -> io::Result<()> {
    let value = linger {
        l_onoff: enabled as c_int,
        l_linger: enabled as c_int,
    };
    set_option(fd, SOL_SOCKET, SO_LINGER, &value)
}

/// Sets the `IPV6_V6ONLY` socket option.
pub(crate) fn sys_set_v6only(fd: RawFd, v6only: bool) -> io::Result<()> {
    let value: c_int = if v6only { 1 } else { 0 };
    set_option(fd, IPPROTO_IPV6, IPV6_V6ONLY, &value)
}

/// Returns the address family matching a socket address.
pub(crate) fn domain_of(addr: &SocketAddr) -> c_int {
    match addr {
        SocketAddr::V4(_) => AF_INET,
        SocketAddr::V6(_) => AF_INET6,
    }
}

/// Converts a `sockaddr_storage` to a Rust `SocketAddr`.
pub(crate) fn sockaddr_storage_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as c_int {
        AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);

            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }

        AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);

            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }

        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported address family",
        )),
    }
}

/// Converts a `SocketAddr` to a `sockaddr_storage`.
pub(crate) fn socketaddr_to_storage(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    match addr {
        SocketAddr::V4(v4) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            sa.sin_family = AF_INET as _;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.s_addr = u32::from(*v4.ip()).to_be();

            (storage, mem::size_of::<sockaddr_in>() as socklen_t)
        }

        SocketAddr::V6(v6) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            sa.sin6_family = AF_INET6 as _;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.s6_addr = v6.ip().octets();
            sa.sin6_flowinfo = v6.flowinfo();
            sa.sin6_scope_id = v6.scope_id();

            (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
        }
    }
}

/// Maps `len` bytes of `fd` read-only and private.
pub(crate) fn sys_mmap_readonly(fd: RawFd, len: usize) -> io::Result<*mut u8> {
    let addr = unsafe { mmap(ptr::null_mut(), len, PROT_READ, MAP_PRIVATE, fd, 0) };
    if addr == MAP_FAILED {
        Err(io::Error::last_os_error())
    } else {
        Ok(addr as *mut u8)
    }
}

/// Unmaps a region previously returned by [`sys_mmap_readonly`].
pub(crate) fn sys_munmap(addr: *mut u8, len: usize) {
    unsafe { munmap(addr as *mut c_void, len) };
}

/// Creates a non-blocking `eventfd` used to interrupt `epoll_wait`.
pub(crate) fn sys_eventfd() -> io::Result<RawFd> {
    let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
    if fd < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

/// Blocks `signals` for the calling thread and returns a `signalfd` that
/// reports them.
///
/// Threads spawned afterwards inherit the mask, so this must run before the
/// worker pool starts.
pub(crate) fn sys_signalfd(signals: &[c_int]) -> io::Result<RawFd> {
    let mut mask: sigset_t = unsafe { mem::zeroed() };

    unsafe {
        sigemptyset(&mut mask);
        for &signal in signals {
            sigaddset(&mut mask, signal);
        }
    }

    let rc = unsafe { libc::pthread_sigmask(SIG_BLOCK, &mask, ptr::null_mut()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }

    let fd = unsafe { signalfd(-1, &mask, SFD_NONBLOCK | SFD_CLOEXEC) };
    if fd < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

/// Reads one pending signal number from a `signalfd`, if any.
pub(crate) fn sys_read_signal(fd: RawFd) -> Option<u32> {
    let mut info: signalfd_siginfo = unsafe { mem::zeroed() };
    let size = mem::size_of::<signalfd_siginfo>();

    let rc = unsafe { libc::read(fd, &mut info as *mut _ as *mut c_void, size) };

    if rc as usize == size {
        Some(info.ssi_signo)
    } else {
        None
    }
}

/// Ignores `SIGPIPE` process-wide so writes to a reset peer fail with `EPIPE`.
pub(crate) fn sys_ignore_sigpipe() {
    unsafe { libc::signal(SIGPIPE, SIG_IGN) };
}

/// Fills `buffer` from the kernel random source.
pub(crate) fn sys_getrandom(buffer: &mut [u8]) -> io::Result<()> {
    let mut filled = 0;

    while filled < buffer.len() {
        let rc = unsafe {
            libc::getrandom(
                buffer[filled..].as_mut_ptr() as *mut c_void,
                buffer.len() - filled,
                0,
            )
        };

        match cvt(rc) {
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(())
}
