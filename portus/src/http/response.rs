//! Response assembly.
//!
//! [`ResponseBuilder::build`] turns a [`ResolvedAction`] into the header
//! bytes in the connection's write buffer plus, for file bodies, the owned
//! [`Content`] the transfer streams after them. File targets are checked
//! before any mapping or descriptor is created: a missing file or a
//! directory becomes 404, a file that is not world-readable 403, and either
//! is answered with the matching error page.

use super::content::{Content, FileSource, MappedFile};
use super::mime;
use crate::buffer::ByteBuffer;
use crate::resolve::{Body, ResolvedAction};

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Reason phrase for the supported status codes.
pub fn reason(status: u16) -> Option<&'static str> {
    match status {
        200 => Some("OK"),
        400 => Some("Bad Request"),
        401 => Some("Unauthorized"),
        403 => Some("Forbidden"),
        404 => Some("Not Found"),
        500 => Some("Internal Server Error"),
        _ => None,
    }
}

/// A response whose header is already in the write buffer.
#[derive(Debug)]
pub struct Prepared {
    pub status: u16,

    /// File content to stream after the header, if any.
    pub content: Option<Content>,

    /// Total body length announced in `Content-Length`.
    pub content_length: u64,
}

/// Body after file checks.
enum Planned {
    Inline {
        content_type: String,
        bytes: Vec<u8>,
    },
    Page(PathBuf, Content),
    Download(PathBuf, Content),
    EmptyFile(PathBuf),
}

/// Builds responses against a resource directory holding the error pages.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    resource_dir: PathBuf,
    keep_alive_max: u32,
    keep_alive_timeout: u32,
}

impl ResponseBuilder {
    pub fn new(resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_dir: resource_dir.into(),
            keep_alive_max: 6,
            keep_alive_timeout: 120,
        }
    }

    /// Sets the `keep-alive: max=.., timeout=..` parameters.
    pub fn keep_alive(mut self, max: u32, timeout_secs: u32) -> Self {
        self.keep_alive_max = max;
        self.keep_alive_timeout = timeout_secs;
        self
    }

    pub fn resource_dir(&self) -> &Path {
        &self.resource_dir
    }

    /// Writes the status line and headers for `action` into `out`, and
    /// inline bodies after them.
    pub fn build(&self, action: ResolvedAction, keep_alive: bool, out: &mut ByteBuffer) -> Prepared {
        let ResolvedAction {
            status,
            body,
            set_cookie,
        } = action;

        let status = if reason(status).is_some() { status } else { 400 };
        let (status, planned) = self.plan(status, body);

        let reason = reason(status).unwrap_or("Bad Request");
        let mut head = String::with_capacity(256);

        let _ = write!(head, "HTTP/1.1 {status} {reason}\r\n");

        if keep_alive {
            let _ = write!(
                head,
                "Connection: keep-alive\r\nkeep-alive: max={}, timeout={}\r\n",
                self.keep_alive_max, self.keep_alive_timeout
            );
        } else {
            head.push_str("Connection: close\r\n");
        }

        if let Some(cookie) = &set_cookie {
            let _ = write!(head, "Set-Cookie: {cookie}\r\n");
        }

        let (content_type, content_length) = match &planned {
            Planned::Inline {
                content_type,
                bytes,
            } => (content_type.as_str(), bytes.len() as u64),
            Planned::Page(path, content) | Planned::Download(path, content) => {
                (mime::content_type(path), content.len())
            }
            Planned::EmptyFile(path) => (mime::content_type(path), 0),
        };
        let _ = write!(head, "Content-Type: {content_type}\r\n");

        if let Planned::Download(path, _) = &planned {
            let name = attachment_name(path);
            let _ = write!(
                head,
                "Content-Disposition: attachment; filename=\"{name}\"\r\n"
            );
        }

        let _ = write!(head, "Content-Length: {content_length}\r\n\r\n");
        out.append_str(&head);

        let content = match planned {
            Planned::Inline { bytes, .. } => {
                out.append(&bytes);
                None
            }
            Planned::Page(_, content) | Planned::Download(_, content) => Some(content),
            Planned::EmptyFile(_) => None,
        };

        debug!(status, content_length, keep_alive, "response built");

        Prepared {
            status,
            content,
            content_length,
        }
    }

    fn plan(&self, status: u16, body: Body) -> (u16, Planned) {
        match body {
            Body::Inline {
                content_type,
                bytes,
            } => (
                status,
                Planned::Inline {
                    content_type,
                    bytes,
                },
            ),

            Body::Page(path) if status == 200 => match open_checked(&path, MappedFile::open) {
                Ok(Some(map)) => (status, Planned::Page(path, Content::Mapped(map))),
                Ok(None) => (status, Planned::EmptyFile(path)),
                Err(code) => self.error_page(code),
            },

            Body::Download(path) if status == 200 => match open_checked(&path, FileSource::open) {
                Ok(Some(file)) => (status, Planned::Download(path, Content::File(file))),
                Ok(None) => (status, Planned::EmptyFile(path)),
                Err(code) => self.error_page(code),
            },

            Body::Empty if status == 200 => (
                status,
                Planned::Inline {
                    content_type: "text/plain".to_owned(),
                    bytes: Vec::new(),
                },
            ),

            _ => self.error_page(status),
        }
    }

    /// The configured page for `status`, or a generated one when it cannot
    /// be served.
    fn error_page(&self, status: u16) -> (u16, Planned) {
        let path = self.resource_dir.join(format!("{status}.html"));

        match open_checked(&path, MappedFile::open) {
            Ok(Some(map)) => (status, Planned::Page(path, Content::Mapped(map))),
            _ => (status, inline_error(status)),
        }
    }
}

/// Checks `path` and opens it with `open`.
///
/// Returns `Ok(None)` for an empty regular file and `Err(status)` when the
/// file cannot be served.
fn open_checked<T>(path: &Path, open: impl FnOnce(&Path) -> io::Result<T>) -> Result<Option<T>, u16> {
    let meta = match fs::metadata(path) {
        Ok(meta) if !meta.is_dir() => meta,
        _ => return Err(404),
    };

    if meta.permissions().mode() & 0o004 == 0 {
        return Err(403);
    }

    if meta.len() == 0 {
        return Ok(None);
    }

    open(path).map(Some).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => 404,
        io::ErrorKind::PermissionDenied => 403,
        _ => 500,
    })
}

/// File name for a `Content-Disposition` header. Quotes, backslashes, and
/// control characters would break out of the quoted-string, so they are dropped.
fn attachment_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();

    name.chars()
        .filter(|c| !matches!(c, '"' | '\\') && !c.is_control())
        .collect()
}

fn inline_error(status: u16) -> Planned {
    let reason = reason(status).unwrap_or("Bad Request");
    let message = match status {
        401 => "Authentication required!",
        403 => "Access denied!",
        404 => "File Not Found!",
        500 => "Internal error!",
        _ => "Bad request!",
    };

    let body = format!(
        "<html><title>Error</title><body bgcolor=\"ffffff\">{status} : {reason}\n<p>{message}</p><hr><em>portus</em></body></html>"
    );

    Planned::Inline {
        content_type: "text/html".to_owned(),
        bytes: body.into_bytes(),
    }
}
