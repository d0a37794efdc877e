//! Owned response content.
//!
//! Each variant owns the kernel resource backing it, and releasing the
//! content is dropping it: the mapping is unmapped or the descriptor closed
//! exactly once, whichever path drops it first.

use crate::reactor::poller::unix::{sys_mmap_readonly, sys_munmap};

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::ptr;

/// A read-only private mapping of a whole file.
#[derive(Debug)]
pub struct MappedFile {
    addr: *mut u8,
    len: usize,
}

// The mapping is read-only and never aliased mutably.
unsafe impl Send for MappedFile {}
unsafe impl Sync for MappedFile {}

impl MappedFile {
    /// Maps the file at `path`, sized to its length at open time.
    ///
    /// An empty file yields an empty mapping without calling `mmap`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = usize::try_from(file.metadata()?.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "file too large to map"))?;

        if len == 0 {
            return Ok(Self {
                addr: ptr::null_mut(),
                len: 0,
            });
        }

        let addr = sys_mmap_readonly(file.as_raw_fd(), len)?;
        Ok(Self { addr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.addr.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.addr, self.len) }
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        if !self.addr.is_null() {
            sys_munmap(self.addr, self.len);
        }
    }
}

/// An open file sent to the socket with `sendfile(2)`.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    len: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// Response content kept outside the write buffer.
#[derive(Debug)]
pub enum Content {
    /// Delivered with `writev` from a memory mapping.
    Mapped(MappedFile),

    /// Delivered with `sendfile` from an open descriptor.
    File(FileSource),
}

impl Content {
    pub fn len(&self) -> u64 {
        match self {
            Content::Mapped(map) => map.len() as u64,
            Content::File(file) => file.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
