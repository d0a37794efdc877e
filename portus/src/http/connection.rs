//! Per-client connection state.
//!
//! A `Connection` owns the socket, both buffers, the parser, and the content
//! of the response in flight. Only one worker operates on it at a time; the
//! dispatch thread hands it out under the one-shot registration discipline.

use super::parser::{ParseStatus, RequestParser};
use super::response::ResponseBuilder;
use super::transfer::{Outbound, SocketSink, Sink, WriteStatus};
use crate::buffer::ByteBuffer;
use crate::reactor::poller::unix::sys_close;
use crate::resolve::{Resolve, ResolvedAction};

use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;

use tracing::debug;

/// Outcome of [`Connection::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The socket is still open; this many bytes were read.
    Open(usize),

    /// The peer closed its side.
    PeerClosed,
}

#[derive(Debug)]
pub struct Connection {
    fd: RawFd,
    peer: SocketAddr,
    serial: u64,

    /// Drain the socket on every read instead of reading once.
    edge: bool,

    read_buf: ByteBuffer,
    write_buf: ByteBuffer,

    parser: RequestParser,
    outbound: Outbound,

    keep_alive: bool,
    closed: bool,
}

impl Connection {
    pub fn new(fd: RawFd, peer: SocketAddr, serial: u64, edge: bool, max_body: usize) -> Self {
        Self {
            fd,
            peer,
            serial,
            edge,
            read_buf: ByteBuffer::new(),
            write_buf: ByteBuffer::new(),
            parser: RequestParser::new(max_body),
            outbound: Outbound::new(),
            keep_alive: false,
            closed: false,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Distinguishes this connection from earlier ones on the same fd.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the last response asked to keep the connection open.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Response bytes not yet sent.
    pub fn to_write_bytes(&self) -> u64 {
        self.outbound.remaining(&self.write_buf)
    }

    /// Bytes received but not yet parsed.
    pub fn pending_input(&self) -> usize {
        self.read_buf.readable_bytes()
    }

    /// Reads from the socket into the read buffer.
    ///
    /// In edge-triggered mode the socket is drained until it would block;
    /// otherwise a single read is made.
    pub fn read(&mut self) -> io::Result<ReadStatus> {
        let mut total = 0;

        loop {
            match self.read_buf.read_fd(self.fd) {
                Ok(0) => return Ok(ReadStatus::PeerClosed),
                Ok(n) => {
                    total += n;
                    if !self.edge {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(ReadStatus::Open(total))
    }

    /// Parses buffered input and, if a request completes, builds its response.
    ///
    /// Returns `true` when a response is ready to write and `false` when more
    /// input is needed. A malformed request is answered with 400 and the
    /// connection is marked to close after it.
    pub fn advance<R>(&mut self, resolver: &R, builder: &ResponseBuilder) -> bool
    where
        R: Resolve + ?Sized,
    {
        if self.to_write_bytes() > 0 {
            return true;
        }

        if self.read_buf.is_empty() {
            return false;
        }

        let (action, keep_alive) = match self.parser.parse(&mut self.read_buf) {
            ParseStatus::NeedMoreData => return false,
            ParseStatus::Complete(request) => {
                debug!(
                    fd = self.fd,
                    method = %request.method,
                    path = %request.path,
                    "request parsed"
                );
                let keep_alive = request.keep_alive();
                (resolver.resolve(&request), keep_alive)
            }
            ParseStatus::Malformed(e) => {
                debug!(fd = self.fd, error = %e, "malformed request");
                self.read_buf.retrieve_all();
                (ResolvedAction::error(400), false)
            }
        };

        self.respond(action, keep_alive, builder);
        true
    }

    fn respond(&mut self, action: ResolvedAction, keep_alive: bool, builder: &ResponseBuilder) {
        self.outbound.release();
        self.write_buf.retrieve_all();
        self.keep_alive = keep_alive;

        let prepared = builder.build(action, keep_alive, &mut self.write_buf);
        if let Some(content) = prepared.content {
            self.outbound.set_content(content);
        }
    }

    /// Transfers the pending response to the socket.
    pub fn write(&mut self) -> io::Result<WriteStatus> {
        let mut sink = SocketSink(self.fd);
        self.write_with(&mut sink)
    }

    /// Transfers the pending response to `sink`.
    pub fn write_with<S: Sink>(&mut self, sink: &mut S) -> io::Result<WriteStatus> {
        self.outbound.write_to(&mut self.write_buf, sink)
    }

    /// Releases response content and closes the socket. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.closed = true;
        self.outbound.release();
        self.read_buf.retrieve_all();
        self.write_buf.retrieve_all();
        self.parser.reset();
        sys_close(self.fd);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
