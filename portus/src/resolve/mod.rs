//! Request resolution.
//!
//! The server core does not decide what a path means. For each completed
//! request it asks a [`Resolve`] implementation for a [`ResolvedAction`] and
//! turns that into a response.
//!
//! - [`StaticResolver`] serves pages from a resource directory and
//!   attachments from a data directory.
//! - [`SessionResolver`] layers login, logout, and session checks over any
//!   other resolver.

mod session;
mod static_files;

pub use session::{SessionResolver, SESSION_COOKIE};
pub use static_files::StaticResolver;

use crate::http::Request;

use std::path::PathBuf;

/// Maps a request to the action that answers it.
///
/// Implementations run on worker threads and may block on file-system or
/// backend access.
pub trait Resolve: Send + Sync {
    fn resolve(&self, request: &Request) -> ResolvedAction;
}

impl<R: Resolve + ?Sized> Resolve for std::sync::Arc<R> {
    fn resolve(&self, request: &Request) -> ResolvedAction {
        (**self).resolve(request)
    }
}

/// What the response should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// No body; error statuses get their error page.
    Empty,

    /// Bytes copied into the write buffer.
    Inline {
        content_type: String,
        bytes: Vec<u8>,
    },

    /// A file served from a memory mapping.
    Page(PathBuf),

    /// A file sent as an attachment with `sendfile`.
    Download(PathBuf),
}

/// Result of resolving one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAction {
    pub status: u16,
    pub body: Body,

    /// Value for a `Set-Cookie` header, when the action has a session effect.
    pub set_cookie: Option<String>,
}

impl ResolvedAction {
    pub fn new(status: u16, body: Body) -> Self {
        Self {
            status,
            body,
            set_cookie: None,
        }
    }

    pub fn page(path: impl Into<PathBuf>) -> Self {
        Self::new(200, Body::Page(path.into()))
    }

    pub fn download(path: impl Into<PathBuf>) -> Self {
        Self::new(200, Body::Download(path.into()))
    }

    pub fn json(status: u16, json: String) -> Self {
        Self::new(
            status,
            Body::Inline {
                content_type: "application/json".to_owned(),
                bytes: json.into_bytes(),
            },
        )
    }

    /// An error status answered with its error page.
    pub fn error(status: u16) -> Self {
        Self::new(status, Body::Empty)
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.set_cookie = Some(cookie.into());
        self
    }
}
