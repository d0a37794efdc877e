use super::handle::ServerHandle;
use super::listener::Listener;
use super::signal::SignalFd;
use super::slot::InFlight;
use super::task::ConnTask;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::{Connection, ResponseBuilder};
use crate::pool::WorkerPool;
use crate::reactor::event::Event;
use crate::reactor::notice::notice_channel;
use crate::reactor::poller::epoll::WAKE_TOKEN;
use crate::reactor::poller::unix::{sys_close, sys_ignore_sigpipe, sys_send};
use crate::reactor::poller::{Interest, Poller};
use crate::reactor::{Notice, NoticeSender, TimerHeap};
use crate::resolve::Resolve;

use std::collections::HashMap;
use std::io;
use std::net::{Ipv6Addr, SocketAddr};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::Instant;

use tracing::{debug, error, info, trace, warn};

/// Reply sent to connections refused at the descriptor ceiling.
const BUSY_REPLY: &[u8] = b"Server busy!";

/// State shared between the dispatch thread and the workers.
pub(crate) struct Shared {
    pub(crate) poller: Poller,
    pub(crate) notices: NoticeSender,
    pub(crate) resolver: Arc<dyn Resolve>,
    pub(crate) builder: ResponseBuilder,

    /// Connections are edge-triggered.
    pub(crate) conn_edge: bool,

    pub(crate) shutdown: AtomicBool,
    pub(crate) live: AtomicUsize,
}

/// A registered connection.
struct Slot {
    conn: Arc<Mutex<Connection>>,
    flight: Arc<InFlight>,
    serial: u64,
}

#[derive(Clone, Copy)]
enum Direction {
    Read,
    Write,
}

/// The HTTP server: listeners, poller, idle timers, worker pool, and the
/// connection table, driven by [`Server::run`] on a single dispatch thread.
///
/// The dispatch thread only multiplexes readiness. Reads, parsing,
/// resolution, and writes happen on the workers. Connections are registered
/// one-shot, and a worker re-arms its connection when it is done, so at
/// most one worker touches a connection at a time. Workers never tear
/// connections down; they post a [`Notice::Close`] and the dispatch thread
/// does it.
pub struct Server {
    shared: Arc<Shared>,
    config: ServerConfig,

    listeners: Vec<Listener>,
    signals: Option<SignalFd>,
    notices: Receiver<Notice>,

    timers: TimerHeap,
    pool: WorkerPool,
    conns: HashMap<RawFd, Slot>,
    next_serial: u64,

    raw: Vec<libc::epoll_event>,
    events: Vec<Event>,
}

impl Server {
    /// Sets up listeners, signal handling, and the worker pool.
    ///
    /// Any failure here is fatal and nothing is left open.
    pub fn new(config: ServerConfig, resolver: Arc<dyn Resolve>) -> Result<Self, ServerError> {
        config.validate()?;
        sys_ignore_sigpipe();

        let poller = Poller::new().map_err(ServerError::Poller)?;
        let (notices, receiver) = notice_channel(poller.waker());

        let primary = config.listen_addr()?;
        let mut listeners = vec![Listener::bind(primary, config.linger, false)?];

        if config.ipv6 && primary.is_ipv4() {
            let port = listeners[0].local_addr().port();
            let addr = SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), port);
            listeners.push(Listener::bind(addr, config.linger, true)?);
        }

        let listen_interest = Interest::readable().edge(config.listen_edge());
        for listener in &listeners {
            poller
                .register(listener.fd(), listener.fd() as u64, listen_interest)
                .map_err(ServerError::Poller)?;
        }

        // Must precede the pool so workers inherit the blocked mask.
        let signals = if config.handle_signals {
            let signals = SignalFd::new().map_err(ServerError::Signal)?;
            poller
                .register(signals.fd(), signals.fd() as u64, Interest::readable())
                .map_err(ServerError::Signal)?;
            Some(signals)
        } else {
            None
        };

        let pool = WorkerPool::new(config.worker_threads)?;

        let builder = ResponseBuilder::new(&config.resource_dir)
            .keep_alive(config.keep_alive_max, config.keep_alive_timeout_s);

        let shared = Arc::new(Shared {
            poller,
            notices,
            resolver,
            builder,
            conn_edge: config.conn_edge(),
            shutdown: AtomicBool::new(false),
            live: AtomicUsize::new(0),
        });

        Ok(Self {
            shared,
            config,
            listeners,
            signals,
            notices: receiver,
            timers: TimerHeap::new(),
            pool,
            conns: HashMap::new(),
            next_serial: 0,
            raw: Vec::new(),
            events: Vec::with_capacity(64),
        })
    }

    /// Address of the primary listener, with the assigned port when the
    /// configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.listeners[0].local_addr()
    }

    /// Addresses of every listener.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(Listener::local_addr).collect()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Runs the dispatch loop until shutdown is requested.
    ///
    /// On exit every connection is closed and the workers are joined. Only
    /// a failing `epoll_wait` makes this return an error.
    pub fn run(&mut self) -> Result<(), ServerError> {
        info!(
            addr = %self.local_addr(),
            listen_edge = self.config.listen_edge(),
            conn_edge = self.config.conn_edge(),
            idle_timeout_ms = self.config.idle_timeout_ms,
            workers = self.pool.threads(),
            resources = %self.config.resource_dir.display(),
            data = %self.config.data_dir.display(),
            "server started"
        );

        let result = self.dispatch_loop();

        self.teardown();
        info!("server stopped");

        result
    }

    fn dispatch_loop(&mut self) -> Result<(), ServerError> {
        while !self.shared.shutdown.load(Ordering::Acquire) {
            let timeout = self.timers.next_deadline(Instant::now());

            if let Err(e) = self
                .shared
                .poller
                .poll(&mut self.raw, &mut self.events, timeout)
            {
                error!(error = %e, "epoll_wait failed");
                return Err(ServerError::Io(e));
            }

            let events = std::mem::take(&mut self.events);
            for event in &events {
                self.handle_event(*event);
            }
            self.events = events;

            self.expire_timers();
            self.drain_notices();
        }

        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        if event.token == WAKE_TOKEN {
            return;
        }

        let fd = event.token as RawFd;

        if let Some(index) = self.listeners.iter().position(|l| l.fd() == fd) {
            self.accept(index);
            return;
        }

        if self.signals.as_ref().is_some_and(|s| s.fd() == fd) {
            self.on_signal();
            return;
        }

        if event.hangup {
            self.close_conn(fd);
        } else if event.readable {
            self.dispatch(fd, Direction::Read);
        } else if event.writable {
            self.dispatch(fd, Direction::Write);
        } else {
            warn!(fd, "unexpected event");
        }
    }

    fn accept(&mut self, index: usize) {
        let edge = self.config.listen_edge();

        loop {
            let (fd, peer) = match self.listeners[index].accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            };

            if self.shared.live.load(Ordering::Acquire) >= self.config.max_connections {
                warn!(%peer, "connection limit reached, refusing client");
                let _ = sys_send(fd, BUSY_REPLY);
                sys_close(fd);
            } else {
                self.add_client(fd, peer);
            }

            if !edge {
                return;
            }
        }
    }

    fn add_client(&mut self, fd: RawFd, peer: SocketAddr) {
        let serial = self.next_serial;
        self.next_serial += 1;

        let conn = Connection::new(
            fd,
            peer,
            serial,
            self.shared.conn_edge,
            self.config.max_body_bytes,
        );

        let interest = Interest::readable()
            .edge(self.shared.conn_edge)
            .oneshot(true);

        if let Err(e) = self.shared.poller.register(fd, fd as u64, interest) {
            warn!(fd, %peer, error = %e, "failed to register client");
            return;
        }

        if let Some(timeout) = self.config.idle_timeout() {
            let notices = self.shared.notices.clone();
            self.timers
                .add(fd as u64, timeout, move || notices.close(fd, serial));
        }

        self.conns.insert(
            fd,
            Slot {
                conn: Arc::new(Mutex::new(conn)),
                flight: Arc::new(InFlight::new()),
                serial,
            },
        );

        let live = self.shared.live.fetch_add(1, Ordering::AcqRel) + 1;
        info!(fd, %peer, live, "client connected");
    }

    /// Hands a ready connection to a worker, unless one already has it.
    fn dispatch(&mut self, fd: RawFd, direction: Direction) {
        let Some(slot) = self.conns.get(&fd) else {
            return;
        };

        if !slot.flight.try_claim() {
            trace!(fd, "task already in flight");
            return;
        }

        let task = ConnTask {
            shared: self.shared.clone(),
            conn: slot.conn.clone(),
            flight: slot.flight.clone(),
            fd,
            serial: slot.serial,
        };
        let flight = slot.flight.clone();

        if let Some(timeout) = self.config.idle_timeout() {
            self.timers.adjust(fd as u64, timeout);
        }

        let submitted = match direction {
            Direction::Read => self.pool.submit(move || task.on_read()),
            Direction::Write => self.pool.submit(move || task.on_write()),
        };

        if !submitted {
            let _ = flight.release();
        }
    }

    /// Tears a connection down. Only ever called on the dispatch thread.
    ///
    /// Never waits on a running task: if a worker holds the connection, the
    /// slot is marked closing and stays in the table until that worker
    /// posts its close notice.
    fn close_conn(&mut self, fd: RawFd) {
        let Some(slot) = self.conns.get(&fd) else {
            return;
        };

        self.timers.cancel(fd as u64);

        let claimed = slot.flight.request_close();
        let cell = slot.conn.clone();

        let mut conn = match cell.try_lock() {
            Ok(conn) => conn,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) if claimed => {
                debug!(fd, "connection busy, deferring close to its worker");
                return;
            }
            // Unclaimed holders are past their work and only re-arming.
            Err(TryLockError::WouldBlock) => cell.lock().unwrap_or_else(PoisonError::into_inner),
        };

        self.conns.remove(&fd);
        self.shared.poller.deregister(fd);
        conn.close();

        let live = self.shared.live.fetch_sub(1, Ordering::AcqRel) - 1;
        info!(fd, peer = %conn.peer(), live, "client quit");
    }

    fn expire_timers(&mut self) {
        for expired in self.timers.pop_expired(Instant::now()) {
            debug!(fd = expired.id, "idle timeout");
            expired.fire();
        }
    }

    fn drain_notices(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            match notice {
                Notice::Close { fd, serial } => {
                    let current = self.conns.get(&fd).is_some_and(|s| s.serial == serial);
                    if current {
                        self.close_conn(fd);
                    } else {
                        trace!(fd, serial, "stale close notice");
                    }
                }
                Notice::Shutdown => self.shared.shutdown.store(true, Ordering::Release),
            }
        }
    }

    fn on_signal(&mut self) {
        let Some(signals) = &self.signals else {
            return;
        };

        while let Some(signal) = signals.read() {
            info!(signal, "shutdown requested");
            self.shared.shutdown.store(true, Ordering::Release);
        }
    }

    fn teardown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);

        self.pool.shutdown();
        self.pool.join();

        let fds: Vec<RawFd> = self.conns.keys().copied().collect();
        for fd in fds {
            self.close_conn(fd);
        }

        while self.notices.try_recv().is_ok() {}
    }
}
