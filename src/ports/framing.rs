use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, Response};
use tokio::io::AsyncBufRead;

use crate::domain::ParseError;

pub type MessageBufRead = dyn AsyncBufRead + Send + Unpin;

/// Decodes a request off the server side of a stream
#[async_trait]
pub trait RequestParser: Send + Sync {
    /// Read one request, including its whole body.
    ///
    /// Must return [`ParseError::EndOfStream`] when the stream ends before the
    /// first byte of a request.
    async fn read_request(&self, reader: &mut MessageBufRead) -> Result<Request<Bytes>, ParseError>;
}

/// Decodes a response head off the client side of a stream
#[async_trait]
pub trait ResponseParser: Send + Sync {
    /// Read the status line and header section of the response to `method`.
    ///
    /// The body is left in `reader`.
    async fn read_response_head(
        &self,
        reader: &mut MessageBufRead,
        method: &Method,
    ) -> Result<Response<()>, ParseError>;
}
