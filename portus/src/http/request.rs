use std::collections::HashMap;
use std::fmt;

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Head,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    /// Any other token, kept verbatim.
    Other(String),
}

impl Method {
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "HEAD" => Method::Head,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "CONNECT" => Method::Connect,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            "PATCH" => Method::Patch,
            other => Method::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
            Method::Other(token) => token,
        }
    }

    /// Methods whose request must declare a `Content-Length`.
    pub fn requires_length(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully parsed HTTP request.
///
/// Header names are stored lower-cased; the last occurrence of a repeated
/// header wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,

    /// Request target up to the first `?`.
    pub path: String,

    /// Percent-decoded query parameters.
    pub query: HashMap<String, String>,

    pub headers: HashMap<String, String>,

    /// Protocol version without the `HTTP/` prefix, e.g. `1.1`.
    pub version: String,

    /// Raw body, exactly `Content-Length` bytes.
    pub body: Vec<u8>,
}

impl Request {
    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether the connection should stay open after the response.
    ///
    /// True only for `HTTP/1.1` requests carrying `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        self.version == "1.1"
            && self
                .header("connection")
                .is_some_and(|value| value.eq_ignore_ascii_case("keep-alive"))
    }

    /// Cookies sent in the `Cookie` header.
    pub fn cookies(&self) -> HashMap<String, String> {
        let Some(header) = self.header("cookie") else {
            return HashMap::new();
        };

        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
            .collect()
    }

    /// Decodes an `application/x-www-form-urlencoded` body.
    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(&self.body)
            .into_owned()
            .collect()
    }
}
