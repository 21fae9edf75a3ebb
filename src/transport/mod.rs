//! HTTP transport used by remote reporters
//!
//! The [`HttpSender`] contract is a single `send(Request) -> Response` call.
//! Three interchangeable backends implement it: [`ConsoleSender`] (logs the
//! request, synthetic 200), [`HttpClientSender`] (connection-pooled reqwest
//! client, the production default) and [`SocketSender`] (minimal
//! single-connection HTTP/1.1 over a raw TCP stream). Reporters are
//! transport-agnostic: all three satisfy identical request/response
//! semantics.

mod client;
mod console;
mod socket;

pub use client::HttpClientSender;
pub use console::ConsoleSender;
pub use socket::SocketSender;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fmt;
use std::io::Write as _;
use thiserror::Error;

/// Errors raised by a transport backend while sending a request.
///
/// These propagate to the caller; reporters catch and log them, so a
/// transport failure is never fatal to the sampling schedule.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("i/o error during send: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Informational,
    Success,
    Redirection,
    ClientError,
    ServerError,
    Unknown,
}

impl StatusClass {
    pub fn of(code: u16) -> Self {
        match code {
            100..=199 => StatusClass::Informational,
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirection,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Unknown,
        }
    }
}

/// An immutable HTTP request: URI, method, ordered unique headers, body.
#[derive(Debug, Clone)]
pub struct Request {
    uri: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    pub fn get(uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(uri, Method::Get)
    }

    pub fn head(uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(uri, Method::Head)
    }

    pub fn post(uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(uri, Method::Post)
    }

    pub fn put(uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(uri, Method::Put)
    }

    pub fn delete(uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(uri, Method::Delete)
    }

    pub fn options(uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(uri, Method::Options)
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Headers in insertion order with unique keys.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.method, self.uri)?;
        if self.body.is_empty() {
            f.write_str("<no request body>")
        } else {
            f.write_str(&String::from_utf8_lossy(&self.body))
        }
    }
}

/// Fluent builder for [`Request`].
#[derive(Debug)]
pub struct RequestBuilder {
    uri: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RequestBuilder {
    fn new(uri: impl Into<String>, method: Method) -> Self {
        Self {
            uri: uri.into(),
            method,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Add a header, replacing any existing value for the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            existing.1 = value;
        } else {
            self.headers.push((name, value));
        }
        self
    }

    /// Set a basic-auth `Authorization` header when `user` is non-blank.
    pub fn basic_auth(self, user: &str, password: &str) -> Self {
        if user.trim().is_empty() {
            return self;
        }
        let credentials = format!("{}:{}", user.trim(), password.trim());
        let encoded = BASE64.encode(credentials.as_bytes());
        self.header("Authorization", format!("Basic {encoded}"))
    }

    /// Set the body with an explicit content type.
    pub fn body(mut self, content_type: &str, content: impl Into<Vec<u8>>) -> Self {
        self.body = content.into();
        self.header("Content-Type", content_type)
    }

    /// Set a JSON (or NDJSON) text body.
    pub fn json(self, content: impl Into<String>) -> Self {
        self.body("application/json", content.into().into_bytes())
    }

    /// Set a plain-text body.
    pub fn plain_text(self, content: impl Into<String>) -> Self {
        self.body("text/plain", content.into().into_bytes())
    }

    /// Add an `Accept: application/json` header.
    pub fn accept_json(self) -> Self {
        self.header("Accept", "application/json")
    }

    /// Gzip-compress the body and add the matching `Content-Encoding` header.
    pub fn gzip(mut self) -> Result<Self, TransportError> {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut encoder = GzEncoder::new(Vec::with_capacity(self.body.len()), Compression::default());
        encoder.write_all(&self.body)?;
        self.body = encoder.finish()?;
        Ok(self.header("Content-Encoding", "gzip"))
    }

    /// Gzip-compress the body only when `when` is true.
    pub fn gzip_when(self, when: bool) -> Result<Self, TransportError> {
        if when {
            self.gzip()
        } else {
            Ok(self)
        }
    }

    pub fn build(self) -> Request {
        Request {
            uri: self.uri,
            method: self.method,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// An HTTP response: status code plus body or a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    code: u16,
    body: String,
}

impl Response {
    pub const NO_RESPONSE_BODY: &'static str = "<no response body>";

    pub fn new(code: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            code,
            body: if body.trim().is_empty() {
                Self::NO_RESPONSE_BODY.to_owned()
            } else {
                body
            },
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Invoke `f` when the status class is informational or success.
    pub fn on_success(&self, f: impl FnOnce(&Response)) -> &Self {
        if self.is_successful() {
            f(self);
        }
        self
    }

    /// Invoke `f` when the status class is a client or server error.
    pub fn on_error(&self, f: impl FnOnce(&Response)) -> &Self {
        match StatusClass::of(self.code) {
            StatusClass::ClientError | StatusClass::ServerError => f(self),
            _ => {}
        }
        self
    }

    pub fn is_successful(&self) -> bool {
        matches!(
            StatusClass::of(self.code),
            StatusClass::Informational | StatusClass::Success
        )
    }
}

/// A transport backend able to deliver a [`Request`] and produce a
/// [`Response`].
#[async_trait]
pub trait HttpSender: Send + Sync + fmt::Debug {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}
