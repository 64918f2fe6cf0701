//! Message body framing for HTTP/1.1 over a stream.
//!
//! [`BodyReader`] decodes a body off a buffered reader according to the
//! [`Framing`] its head declared. Close-delimited bodies end at the stream's
//! end-of-message marker.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, Method, StatusCode};
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

use crate::domain::ParseError;

/// Longest chunk-size or trailer line accepted.
const MAX_LINE_LENGTH: usize = 4096;

/// How the length of a message body is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Empty,
    Length(u64),
    Chunked,
    /// The body runs until the end of the message.
    CloseDelimited,
}

impl Framing {
    pub fn for_request(headers: &HeaderMap) -> Result<Self, ParseError> {
        if is_chunked(headers) {
            return Ok(Framing::Chunked);
        }
        match content_length(headers)? {
            Some(0) | None => Ok(Framing::Empty),
            Some(n) => Ok(Framing::Length(n)),
        }
    }

    pub fn for_response(
        method: &Method,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<Self, ParseError> {
        if method == Method::HEAD
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
        {
            return Ok(Framing::Empty);
        }
        if is_chunked(headers) {
            return Ok(Framing::Chunked);
        }
        match content_length(headers)? {
            Some(0) => Ok(Framing::Empty),
            Some(n) => Ok(Framing::Length(n)),
            None => Ok(Framing::CloseDelimited),
        }
    }
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .last()
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.rsplit(',')
                .next()
                .map(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
                .unwrap_or(false)
        })
        .unwrap_or(false)
}

fn content_length(headers: &HeaderMap) -> Result<Option<u64>, ParseError> {
    let mut length = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let parsed = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| ParseError::Malformed("Invalid Content-Length".to_string()))?;
        if length.map_or(false, |l| l != parsed) {
            return Err(ParseError::Malformed(
                "Conflicting Content-Length headers".to_string(),
            ));
        }
        length = Some(parsed);
    }
    Ok(length)
}

#[derive(Debug)]
enum State {
    Remaining(u64),
    UntilEnd,
    ChunkSize,
    ChunkData(u64),
    ChunkDataEnd,
    Trailers,
    Done,
}

/// Decodes a framed body, yielding end-of-file once the body is complete.
pub struct BodyReader<R> {
    inner: R,
    state: State,
    line: Vec<u8>,
}

impl<R> BodyReader<R> {
    pub fn new(inner: R, framing: Framing) -> Self {
        let state = match framing {
            Framing::Empty => State::Done,
            Framing::Length(n) => State::Remaining(n),
            Framing::Chunked => State::ChunkSize,
            Framing::CloseDelimited => State::UntilEnd,
        };
        Self {
            inner,
            state,
            line: Vec::new(),
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Stops decoding; later reads report end-of-file.
    pub fn finish(&mut self) {
        self.state = State::Done;
    }
}

impl<R: AsyncBufRead + Unpin> BodyReader<R> {
    /// Copies up to `limit` buffered bytes into `out`.
    fn poll_copy(
        &mut self,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
        limit: Option<u64>,
    ) -> Poll<io::Result<usize>> {
        let available = ready!(Pin::new(&mut self.inner).poll_fill_buf(cx))?;
        let mut n = available.len().min(out.remaining());
        if let Some(limit) = limit {
            n = n.min(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        out.put_slice(&available[..n]);
        Pin::new(&mut self.inner).consume(n);
        Poll::Ready(Ok(n))
    }

    /// Accumulates one CRLF-terminated line into `self.line`.
    fn poll_line(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            let available = ready!(Pin::new(&mut self.inner).poll_fill_buf(cx))?;
            if available.is_empty() {
                return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()));
            }
            let (n, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            self.line.extend_from_slice(&available[..n]);
            Pin::new(&mut self.inner).consume(n);
            if self.line.len() > MAX_LINE_LENGTH {
                return Poll::Ready(Err(invalid_data("chunk line too long")));
            }
            if complete {
                return Poll::Ready(Ok(()));
            }
        }
    }
}

impl<R: AsyncBufRead + Unpin> AsyncRead for BodyReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if out.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            match this.state {
                State::Done => return Poll::Ready(Ok(())),
                State::Remaining(0) => this.state = State::Done,
                State::Remaining(remaining) => {
                    let n = ready!(this.poll_copy(cx, out, Some(remaining)))?;
                    if n == 0 {
                        return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()));
                    }
                    this.state = State::Remaining(remaining - n as u64);
                    return Poll::Ready(Ok(()));
                }
                State::UntilEnd => {
                    let n = ready!(this.poll_copy(cx, out, None))?;
                    if n == 0 {
                        this.state = State::Done;
                    }
                    return Poll::Ready(Ok(()));
                }
                State::ChunkSize => {
                    ready!(this.poll_line(cx))?;
                    let size = match httparse::parse_chunk_size(&this.line) {
                        Ok(httparse::Status::Complete((_, size))) => size,
                        _ => return Poll::Ready(Err(invalid_data("invalid chunk size line"))),
                    };
                    this.line.clear();
                    this.state = if size == 0 {
                        State::Trailers
                    } else {
                        State::ChunkData(size)
                    };
                }
                State::ChunkData(remaining) => {
                    let n = ready!(this.poll_copy(cx, out, Some(remaining)))?;
                    if n == 0 {
                        return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()));
                    }
                    let remaining = remaining - n as u64;
                    this.state = if remaining == 0 {
                        State::ChunkDataEnd
                    } else {
                        State::ChunkData(remaining)
                    };
                    return Poll::Ready(Ok(()));
                }
                State::ChunkDataEnd => {
                    ready!(this.poll_line(cx))?;
                    if !is_blank_line(&this.line) {
                        return Poll::Ready(Err(invalid_data("missing CRLF after chunk data")));
                    }
                    this.line.clear();
                    this.state = State::ChunkSize;
                }
                State::Trailers => {
                    ready!(this.poll_line(cx))?;
                    let end = is_blank_line(&this.line);
                    this.line.clear();
                    if end {
                        this.state = State::Done;
                    }
                }
            }
        }
    }
}

fn is_blank_line(line: &[u8]) -> bool {
    line == b"\r\n" || line == b"\n"
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use tokio::io::{AsyncReadExt, BufReader};

    async fn decode(raw: &'static [u8], framing: Framing) -> io::Result<Vec<u8>> {
        let mut body = BodyReader::new(BufReader::new(raw), framing);
        let mut out = Vec::new();
        body.read_to_end(&mut out).await?;
        Ok(out)
    }

    #[tokio::test]
    async fn test_length_body_stops_at_declared_length() {
        assert_eq!(decode(b"HELLOWORLD", Framing::Length(5)).await.unwrap(), b"HELLO");
    }

    #[tokio::test]
    async fn test_chunked_body_with_extension_and_trailer() {
        let raw = b"3;ext=1\r\nHEL\r\n2\r\nLO\r\n0\r\nX-Trailer: yes\r\n\r\nignored";
        assert_eq!(decode(raw, Framing::Chunked).await.unwrap(), b"HELLO");
    }

    #[tokio::test]
    async fn test_truncated_chunked_body_fails() {
        let err = decode(b"5\r\nHEL", Framing::Chunked).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_close_delimited_body_reads_to_end() {
        assert_eq!(decode(b"HELLO", Framing::CloseDelimited).await.unwrap(), b"HELLO");
    }

    #[test]
    fn test_response_framing() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            Framing::for_response(&Method::GET, StatusCode::OK, &headers).unwrap(),
            Framing::CloseDelimited
        );

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("5"));
        assert_eq!(
            Framing::for_response(&Method::GET, StatusCode::OK, &headers).unwrap(),
            Framing::Length(5)
        );
        assert_eq!(
            Framing::for_response(&Method::HEAD, StatusCode::OK, &headers).unwrap(),
            Framing::Empty
        );

        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("gzip, chunked"));
        assert_eq!(
            Framing::for_response(&Method::GET, StatusCode::OK, &headers).unwrap(),
            Framing::Chunked
        );
    }

    #[test]
    fn test_request_without_length_has_no_body() {
        let headers = HeaderMap::new();
        assert_eq!(Framing::for_request(&headers).unwrap(), Framing::Empty);
    }

    #[test]
    fn test_conflicting_content_length_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.append(CONTENT_LENGTH, HeaderValue::from_static("5"));
        headers.append(CONTENT_LENGTH, HeaderValue::from_static("6"));
        assert!(Framing::for_request(&headers).is_err());
    }
}
