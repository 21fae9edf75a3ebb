//! Minimal single-connection HTTP/1.1 sender over a raw TCP stream
//!
//! Fallback transport with no pooling and no TLS: one connection per
//! request, `Connection: close`, body framed by `Content-Length` or by
//! connection close. Shares the [`HttpSender`] contract with the pooled
//! client, so reporters cannot tell them apart.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{HttpSender, Request, Response, TransportError};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw-socket sender.
#[derive(Debug, Clone)]
pub struct SocketSender {
    connect_timeout: Duration,
    read_timeout: Duration,
}

/// The pieces of an `http://host[:port][/path]` URI the raw sender needs.
#[derive(Debug, PartialEq, Eq)]
struct ParsedUri {
    host: String,
    port: u16,
    path: String,
}

fn parse_uri(uri: &str) -> Result<ParsedUri, TransportError> {
    let invalid = |reason: &str| TransportError::InvalidUri {
        uri: uri.to_owned(),
        reason: reason.to_owned(),
    };

    let rest = uri
        .strip_prefix("http://")
        .ok_or_else(|| invalid("only http:// is supported"))?;

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };
    if authority.is_empty() {
        return Err(invalid("missing host"));
    }

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| invalid("invalid port number"))?;
            (host, port)
        }
        None => (authority, 80),
    };
    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    Ok(ParsedUri {
        host: host.to_owned(),
        port,
        path: path.to_owned(),
    })
}

impl SocketSender {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_timeouts(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    fn render_head(request: &Request, parsed: &ParsedUri) -> Vec<u8> {
        let mut head = format!("{} {} HTTP/1.1\r\n", request.method(), parsed.path);
        head.push_str(&format!("Host: {}:{}\r\n", parsed.host, parsed.port));
        head.push_str("Connection: close\r\n");
        for (name, value) in request.headers() {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str(&format!("Content-Length: {}\r\n\r\n", request.body().len()));
        head.into_bytes()
    }
}

impl Default for SocketSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpSender for SocketSender {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let parsed = parse_uri(request.uri())?;

        let stream = timeout(
            self.connect_timeout,
            TcpStream::connect((parsed.host.as_str(), parsed.port)),
        )
        .await
        .map_err(|_| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            ))
        })??;

        let mut stream = stream;
        stream.write_all(&Self::render_head(&request, &parsed)).await?;
        stream.write_all(request.body()).await?;
        stream.flush().await?;

        let raw = timeout(self.read_timeout, read_to_end(&mut stream))
            .await
            .map_err(|_| {
                TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "read timed out",
                ))
            })??;

        parse_response(&raw)
    }
}

async fn read_to_end(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut reader = BufReader::new(stream);
    let mut raw = Vec::with_capacity(1024);
    reader.read_to_end(&mut raw).await?;
    Ok(raw)
}

/// Parse a full `Connection: close` HTTP/1.x response: status line, headers,
/// everything after the blank line is the body.
fn parse_response(raw: &[u8]) -> Result<Response, TransportError> {
    let text = String::from_utf8_lossy(raw);
    let mut lines = text.splitn(2, "\r\n");
    let status_line = lines
        .next()
        .ok_or_else(|| TransportError::MalformedResponse("empty response".to_owned()))?;

    // "HTTP/1.1 200 OK"
    let code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            TransportError::MalformedResponse(format!("bad status line: {status_line}"))
        })?;

    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_owned())
        .unwrap_or_default();

    Ok(Response::new(code, body))
}
