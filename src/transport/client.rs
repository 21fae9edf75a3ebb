//! Connection-pooled async client, the production default

use async_trait::async_trait;
use std::time::Duration;

use super::{HttpSender, Method, Request, Response, TransportError};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// reqwest-backed sender with bounded connect and request timeouts.
#[derive(Debug, Clone)]
pub struct HttpClientSender {
    client: reqwest::Client,
}

impl HttpClientSender {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Build a sender with explicit connect and whole-request timeouts.
    pub fn with_timeouts(
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

#[async_trait]
impl HttpSender for HttpClientSender {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method()), request.uri());

        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        if !request.body().is_empty() {
            builder = builder.body(request.body().to_vec());
        }

        let http_response = builder.send().await?;
        let code = http_response.status().as_u16();
        let body = http_response.text().await.unwrap_or_default();
        Ok(Response::new(code, body))
    }
}
