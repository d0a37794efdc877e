//! Resumable response transfer.
//!
//! A response is two vectors: the header bytes in the connection's write
//! buffer, then the content. [`Outbound::write_to`] keeps transferring until
//! both are exhausted or the sink would block, and may be called again after
//! the next writable event. Header progress lives in the write buffer's read
//! cursor and content progress in [`Outbound`]'s offset, so no byte is ever
//! sent twice.

use super::content::Content;
use crate::buffer::ByteBuffer;
use crate::reactor::poller::unix::{sys_sendfile, sys_writev};

use std::io::{self, IoSlice};
use std::os::fd::RawFd;

/// Destination of response bytes.
pub trait Sink {
    /// Gather-writes `bufs`, returning how many bytes were accepted.
    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize>;

    /// Sends up to `count` bytes of `file` starting at `offset`.
    fn send_file(&mut self, file: RawFd, offset: u64, count: usize) -> io::Result<usize>;
}

/// A connected non-blocking socket.
#[derive(Debug, Clone, Copy)]
pub struct SocketSink(pub RawFd);

impl Sink for SocketSink {
    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        sys_writev(self.0, bufs)
    }

    fn send_file(&mut self, file: RawFd, offset: u64, count: usize) -> io::Result<usize> {
        let mut offset = offset;
        sys_sendfile(self.0, file, &mut offset, count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Every byte was sent and the content released.
    Done,

    /// The sink would block; call again on the next writable event.
    Pending,
}

/// Content half of an in-flight response.
#[derive(Debug, Default)]
pub struct Outbound {
    content: Option<Content>,
    offset: u64,
}

impl Outbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches content for the next response, releasing any previous one.
    pub fn set_content(&mut self, content: Content) {
        self.content = Some(content);
        self.offset = 0;
    }

    /// Whether content is still held.
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Content bytes not yet sent.
    pub fn content_remaining(&self) -> u64 {
        self.content
            .as_ref()
            .map_or(0, |content| content.len() - self.offset)
    }

    /// Header and content bytes not yet sent.
    pub fn remaining(&self, header: &ByteBuffer) -> u64 {
        header.readable_bytes() as u64 + self.content_remaining()
    }

    /// Drops the content. Returns `true` if content was held.
    ///
    /// This is the only release path; both completion and teardown go
    /// through it, and `take` makes the second call a no-op.
    pub fn release(&mut self) -> bool {
        self.offset = 0;
        self.content.take().is_some()
    }

    /// Transfers as much of the response as the sink accepts.
    pub fn write_to<S: Sink>(
        &mut self,
        header: &mut ByteBuffer,
        sink: &mut S,
    ) -> io::Result<WriteStatus> {
        loop {
            if self.remaining(header) == 0 {
                self.release();
                header.retrieve_all();
                return Ok(WriteStatus::Done);
            }

            let result = self.write_once(header, sink);

            let written = match result {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(WriteStatus::Pending);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            let from_header = written.min(header.readable_bytes());
            header.retrieve(from_header);
            self.offset += (written - from_header) as u64;
        }
    }

    fn write_once<S: Sink>(&self, header: &ByteBuffer, sink: &mut S) -> io::Result<usize> {
        let pending = header.peek();
        let offset = self.offset as usize;

        match &self.content {
            Some(Content::Mapped(map)) => {
                let body = &map.as_slice()[offset..];

                if pending.is_empty() {
                    sink.write_vectored(&[IoSlice::new(body)])
                } else {
                    sink.write_vectored(&[IoSlice::new(pending), IoSlice::new(body)])
                }
            }

            // The header is flushed before sendfile takes over.
            Some(Content::File(file)) if pending.is_empty() => {
                let count = usize::try_from(file.len() - self.offset).unwrap_or(usize::MAX);
                sink.send_file(file.fd(), self.offset, count)
            }

            Some(Content::File(_)) | None => sink.write_vectored(&[IoSlice::new(pending)]),
        }
    }
}
