//! HTTP/1.1 framing: request parsing, response assembly, and the
//! per-connection state machine that ties them to the socket.

pub mod connection;
pub mod content;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod transfer;

pub use connection::{Connection, ReadStatus};
pub use content::{Content, FileSource, MappedFile};
pub use parser::{ParseError, ParseState, ParseStatus, RequestParser};
pub use request::{Method, Request};
pub use response::{Prepared, ResponseBuilder};
pub use transfer::{Outbound, Sink, SocketSink, WriteStatus};
