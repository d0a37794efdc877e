//! Incremental HTTP/1.x request parser.
//!
//! The parser walks `RequestLine -> Headers -> Body -> Finish` and retires
//! bytes from the buffer as each line or body completes, so a call after
//! more data arrives resumes exactly where the previous one stopped. After
//! yielding a request it resets to `RequestLine`; any bytes left in the
//! buffer are the start of the next pipelined request.

use super::request::{Method, Request};
use crate::buffer::ByteBuffer;

use std::collections::HashMap;
use std::mem;

use thiserror::Error;

/// Default ceiling on a declared `Content-Length`.
pub const DEFAULT_MAX_BODY: usize = 1 << 30;

/// Why a request could not be parsed. Every variant maps to a 400 reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed request line")]
    BadRequestLine,

    #[error("malformed header line")]
    BadHeader,

    #[error("invalid Content-Length")]
    BadContentLength,

    #[error("body of {length} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { length: usize, limit: usize },

    #[error("{0} request without Content-Length")]
    LengthRequired(Method),

    #[error("unsupported protocol version HTTP/{0}")]
    UnsupportedVersion(String),
}

/// Outcome of [`RequestParser::parse`].
#[derive(Debug)]
pub enum ParseStatus {
    /// The buffer ends mid-request; call again after more bytes arrive.
    NeedMoreData,

    /// A full request was consumed from the buffer.
    Complete(Request),

    Malformed(ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    RequestLine,
    Headers,
    Body,
    Finish,
}

#[derive(Debug)]
pub struct RequestParser {
    state: ParseState,
    max_body: usize,

    method: Method,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    version: String,
    body: Vec<u8>,
    content_length: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY)
    }
}

impl RequestParser {
    pub fn new(max_body: usize) -> Self {
        Self {
            state: ParseState::RequestLine,
            max_body,
            method: Method::Get,
            path: String::new(),
            query: HashMap::new(),
            headers: HashMap::new(),
            version: String::new(),
            body: Vec::new(),
            content_length: 0,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Discards any partially parsed request.
    pub fn reset(&mut self) {
        let max_body = self.max_body;
        *self = Self::new(max_body);
    }

    /// Advances the state machine over the readable bytes of `buffer`.
    pub fn parse(&mut self, buffer: &mut ByteBuffer) -> ParseStatus {
        loop {
            match self.state {
                ParseState::RequestLine => {
                    let Some(end) = buffer.find_crlf() else {
                        return ParseStatus::NeedMoreData;
                    };

                    if let Err(e) = self.parse_request_line(&buffer.peek()[..end]) {
                        return self.fail(e);
                    }

                    buffer.retrieve(end + 2);
                    self.state = ParseState::Headers;
                }

                ParseState::Headers => {
                    let Some(end) = buffer.find_crlf() else {
                        return ParseStatus::NeedMoreData;
                    };

                    if end == 0 {
                        buffer.retrieve(2);

                        match self.body_length() {
                            Ok(length) => self.content_length = length,
                            Err(e) => return self.fail(e),
                        }
                        self.state = ParseState::Body;
                        continue;
                    }

                    if let Err(e) = self.parse_header(&buffer.peek()[..end]) {
                        return self.fail(e);
                    }
                    buffer.retrieve(end + 2);
                }

                ParseState::Body => {
                    if buffer.readable_bytes() < self.content_length {
                        return ParseStatus::NeedMoreData;
                    }

                    self.body = buffer.peek()[..self.content_length].to_vec();
                    buffer.retrieve(self.content_length);
                    self.state = ParseState::Finish;
                }

                ParseState::Finish => {
                    let request = self.take_request();
                    self.reset();
                    return ParseStatus::Complete(request);
                }
            }
        }
    }

    fn fail(&mut self, error: ParseError) -> ParseStatus {
        self.reset();
        ParseStatus::Malformed(error)
    }

    /// `METHOD SP TARGET SP HTTP/VERSION`, with no other spaces.
    fn parse_request_line(&mut self, line: &[u8]) -> Result<(), ParseError> {
        let line = std::str::from_utf8(line).map_err(|_| ParseError::BadRequestLine)?;

        let mut parts = line.split(' ');
        let (Some(method), Some(target), Some(protocol), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::BadRequestLine);
        };

        let version = protocol
            .strip_prefix("HTTP/")
            .ok_or(ParseError::BadRequestLine)?;

        if method.is_empty() || target.is_empty() {
            return Err(ParseError::BadRequestLine);
        }

        if version != "1.0" && version != "1.1" {
            return Err(ParseError::UnsupportedVersion(version.to_owned()));
        }

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        self.method = Method::parse(method);
        self.path = path.to_owned();
        self.version = version.to_owned();

        if let Some(query) = query {
            self.query = url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect();
        }

        Ok(())
    }

    /// `Name: Value`, the space after the colon being optional.
    fn parse_header(&mut self, line: &[u8]) -> Result<(), ParseError> {
        let line = String::from_utf8_lossy(line);

        let (name, value) = line.split_once(':').ok_or(ParseError::BadHeader)?;
        if name.is_empty() {
            return Err(ParseError::BadHeader);
        }

        self.headers
            .insert(name.to_ascii_lowercase(), value.trim().to_owned());

        Ok(())
    }

    fn body_length(&self) -> Result<usize, ParseError> {
        match self.headers.get("content-length") {
            Some(value) => {
                let length = value
                    .parse::<usize>()
                    .map_err(|_| ParseError::BadContentLength)?;

                if length > self.max_body {
                    return Err(ParseError::BodyTooLarge {
                        length,
                        limit: self.max_body,
                    });
                }

                Ok(length)
            }
            None if self.method.requires_length() => {
                Err(ParseError::LengthRequired(self.method.clone()))
            }
            None => Ok(0),
        }
    }

    fn take_request(&mut self) -> Request {
        Request {
            method: mem::replace(&mut self.method, Method::Get),
            path: mem::take(&mut self.path),
            query: mem::take(&mut self.query),
            headers: mem::take(&mut self.headers),
            version: mem::take(&mut self.version),
            body: mem::take(&mut self.body),
        }
    }
}
