//! Growable byte buffer with contiguous readable and writable regions.
//!
//! Layout:
//!
//! ```text
//! +-------------------+------------------+------------------+
//! | retired bytes     | readable bytes   | writable bytes   |
//! +-------------------+------------------+------------------+
//! 0            read_pos         write_pos          capacity
//! ```
//!
//! `0 <= read_pos <= write_pos <= capacity` holds at all times.

use crate::reactor::poller::unix::{sys_readv, sys_writev};

use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::RawFd;

/// Capacity a fresh buffer starts with.
pub const INITIAL_CAPACITY: usize = 1024;

/// Size of the on-stack spill area used by [`ByteBuffer::read_fd`].
const SPILL_SIZE: usize = 64 * 1024;

/// A per-connection, per-direction byte store.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    storage: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl Default for ByteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteBuffer {
    /// Creates a buffer with [`INITIAL_CAPACITY`] bytes of storage.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Creates a buffer with the given storage size.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Bytes available to read.
    pub fn readable_bytes(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Bytes that can be appended without reorganizing storage.
    pub fn writable_bytes(&self) -> usize {
        self.storage.len() - self.write_pos
    }

    /// Bytes already retired in front of the readable region.
    pub fn prependable_bytes(&self) -> usize {
        self.read_pos
    }

    /// Total storage size.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readable_bytes() == 0
    }

    /// The readable region, without consuming it.
    pub fn peek(&self) -> &[u8] {
        &self.storage[self.read_pos..self.write_pos]
    }

    /// Position of the first CRLF in the readable region, relative to
    /// [`peek`](Self::peek).
    pub fn find_crlf(&self) -> Option<usize> {
        self.peek().windows(2).position(|window| window == b"\r\n")
    }

    /// Consumes `len` readable bytes.
    ///
    /// Consuming everything resets both cursors to the front so the whole
    /// storage becomes writable again.
    pub fn retrieve(&mut self, len: usize) {
        if len >= self.readable_bytes() {
            self.retrieve_all();
        } else {
            self.read_pos += len;
        }
    }

    /// Consumes readable bytes up to `end`, an offset into [`peek`](Self::peek).
    pub fn retrieve_until(&mut self, end: usize) {
        self.retrieve(end);
    }

    /// Consumes every readable byte.
    pub fn retrieve_all(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Consumes every readable byte, returning a copy of them.
    pub fn retrieve_all_to_vec(&mut self) -> Vec<u8> {
        let bytes = self.peek().to_vec();
        self.retrieve_all();
        bytes
    }

    /// Appends `data`, making room first if necessary.
    pub fn append(&mut self, data: &[u8]) {
        self.ensure_writable(data.len());
        self.storage[self.write_pos..self.write_pos + data.len()].copy_from_slice(data);
        self.write_pos += data.len();
    }

    pub fn append_str(&mut self, data: &str) {
        self.append(data.as_bytes());
    }

    /// Guarantees at least `len` writable bytes.
    pub fn ensure_writable(&mut self, len: usize) {
        if self.writable_bytes() < len {
            self.make_space(len);
        }
    }

    /// Marks `len` bytes of the writable region as written.
    pub fn has_written(&mut self, len: usize) {
        debug_assert!(len <= self.writable_bytes());
        self.write_pos = (self.write_pos + len).min(self.storage.len());
    }

    /// The writable region.
    pub fn writable_slice(&mut self) -> &mut [u8] {
        let write_pos = self.write_pos;
        &mut self.storage[write_pos..]
    }

    fn make_space(&mut self, len: usize) {
        if self.writable_bytes() + self.prependable_bytes() < len {
            self.storage.resize(self.write_pos + len, 0);
        } else {
            let readable = self.readable_bytes();
            self.storage.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = readable;
        }
    }

    /// Performs one vectored read from `fd` into the buffer.
    ///
    /// The read scatters into the writable region and a 64 KiB spill area,
    /// so a single call can take in more than the current free space. Returns
    /// the byte count; `Ok(0)` means the peer closed its side.
    pub fn read_fd(&mut self, fd: RawFd) -> io::Result<usize> {
        let mut spill = [0u8; SPILL_SIZE];
        let writable = self.writable_bytes();

        let n = {
            let write_pos = self.write_pos;
            let (_, tail) = self.storage.split_at_mut(write_pos);
            let mut slices = [IoSliceMut::new(tail), IoSliceMut::new(&mut spill)];
            sys_readv(fd, &mut slices)?
        };

        if n <= writable {
            self.write_pos += n;
        } else {
            self.write_pos = self.storage.len();
            self.append(&spill[..n - writable]);
        }

        Ok(n)
    }

    /// Writes the readable region to `fd`, consuming what was accepted.
    pub fn write_fd(&mut self, fd: RawFd) -> io::Result<usize> {
        let n = sys_writev(fd, &[IoSlice::new(self.peek())])?;
        self.retrieve(n);
        Ok(n)
    }
}
