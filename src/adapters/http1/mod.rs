//! HTTP/1.1 message framing over stream readers and writers.

mod body;
mod parse;
mod write;

pub use body::{BodyReader, Framing};
pub use parse::{read_request, read_response_head};
pub use write::{write_proxy_request, write_response};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{self, HeaderName};
use http::{HeaderMap, Method, Request, Response};

use crate::domain::ParseError;
use crate::ports::{MessageBufRead, RequestParser, ResponseParser};

/// Headers that describe a single connection hop and are never forwarded verbatim.
pub(crate) fn is_hop_by_hop(name: &HeaderName) -> bool {
    *name == header::CONNECTION
        || *name == header::CONTENT_LENGTH
        || *name == header::TRANSFER_ENCODING
        || *name == header::TE
        || *name == header::TRAILER
        || *name == header::UPGRADE
        || *name == header::PROXY_AUTHORIZATION
        || name.as_str() == "keep-alive"
        || name.as_str() == "proxy-connection"
}

/// Declared body length, unless the message is chunked or the header is unusable.
pub(crate) fn content_length_hint(headers: &HeaderMap) -> Option<u64> {
    if headers.contains_key(header::TRANSFER_ENCODING) {
        return None;
    }
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Default request parser for the tunnel server.
#[derive(Debug, Default, Clone, Copy)]
pub struct Http1RequestParser;

#[async_trait]
impl RequestParser for Http1RequestParser {
    async fn read_request(&self, reader: &mut MessageBufRead) -> Result<Request<Bytes>, ParseError> {
        read_request(reader).await
    }
}

/// Default response parser for the tunnel client.
#[derive(Debug, Default, Clone, Copy)]
pub struct Http1ResponseParser;

#[async_trait]
impl ResponseParser for Http1ResponseParser {
    async fn read_response_head(
        &self,
        reader: &mut MessageBufRead,
        _method: &Method,
    ) -> Result<Response<()>, ParseError> {
        read_response_head(reader).await
    }
}
