//! Logging sender for testing and offline operation

use async_trait::async_trait;

use super::{HttpSender, Request, Response, TransportError};

/// Prints every request to stdout and answers with a synthetic 200.
///
/// Used as the default sender so a reporter can be exercised with no
/// network destination at all.
#[derive(Debug, Default)]
pub struct ConsoleSender;

impl ConsoleSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HttpSender for ConsoleSender {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        println!("{request}");
        Ok(Response::new(200, ""))
    }
}
