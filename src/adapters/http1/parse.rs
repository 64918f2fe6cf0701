use std::str::FromStr;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::body::{BodyReader, Framing};
use crate::domain::ParseError;

/// Upper bound for a request/status line plus header section.
pub(crate) const HEADER_SECTION_MAX_LENGTH: usize = 64 * 1024;

const MAX_HEADERS: usize = 64;

/// Reads one request, buffering its body in full.
pub async fn read_request<R>(reader: &mut R) -> Result<Request<Bytes>, ParseError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let head = read_head(reader).await?.ok_or(ParseError::EndOfStream)?;
    let request = parse_request_head(&head)?;

    let framing = Framing::for_request(request.headers())?;
    let mut body = Vec::new();
    BodyReader::new(&mut *reader, framing)
        .read_to_end(&mut body)
        .await?;

    Ok(request.map(|()| Bytes::from(body)))
}

/// Reads a response status line and header section, leaving the body in `reader`.
///
/// The stream ending before the head is complete, including before its first
/// byte, is reported as [`ParseError::UnexpectedEof`].
pub async fn read_response_head<R>(reader: &mut R) -> Result<Response<()>, ParseError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let head = read_head(reader).await?.ok_or(ParseError::UnexpectedEof)?;
    parse_response_head(&head)
}

/// Accumulates lines up to and including the blank line closing the header section.
///
/// Returns `None` if the stream ends before any byte was read.
async fn read_head<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ParseError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut head = Vec::with_capacity(1024);
    loop {
        let line_start = head.len();
        // One byte past the limit is enough to tell an oversized head apart.
        let budget = (HEADER_SECTION_MAX_LENGTH + 1 - head.len()) as u64;
        let n = (&mut *reader).take(budget).read_until(b'\n', &mut head).await?;
        if n == 0 {
            if head.is_empty() {
                return Ok(None);
            }
            return Err(ParseError::UnexpectedEof);
        }
        if head.len() > HEADER_SECTION_MAX_LENGTH {
            return Err(ParseError::Malformed(
                "header section exceeds size limit".to_string(),
            ));
        }
        let line = &head[line_start..];
        if line == b"\r\n" || line == b"\n" {
            // Tolerate blank lines before the request line.
            if line_start == 0 {
                head.clear();
                continue;
            }
            return Ok(Some(head));
        }
        if !line.ends_with(b"\n") {
            return Err(ParseError::UnexpectedEof);
        }
    }
}

fn parse_request_head(buf: &[u8]) -> Result<Request<()>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    match req.parse(buf).map_err(malformed("Invalid HTTP request"))? {
        httparse::Status::Partial => Err(ParseError::UnexpectedEof),
        httparse::Status::Complete(_) => {
            let method = req
                .method
                .ok_or_else(|| ParseError::Malformed("Missing HTTP method".to_string()))?;
            let method = Method::from_bytes(method.as_bytes())
                .map_err(malformed("Invalid HTTP method"))?;
            let target = req
                .path
                .ok_or_else(|| ParseError::Malformed("Missing request target".to_string()))?;
            let uri = Uri::from_str(target).map_err(malformed("Invalid request target"))?;

            let mut request = Request::new(());
            *request.method_mut() = method;
            *request.uri_mut() = uri;
            *request.version_mut() = version(req.version);
            *request.headers_mut() = header_map(req.headers)?;
            Ok(request)
        }
    }
}

fn parse_response_head(buf: &[u8]) -> Result<Response<()>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut headers);
    match res
        .parse(buf)
        .map_err(malformed("Failed to parse HTTP response"))?
    {
        httparse::Status::Partial => Err(ParseError::UnexpectedEof),
        httparse::Status::Complete(_) => {
            let code = res
                .code
                .ok_or_else(|| ParseError::Malformed("Missing response status code".to_string()))?;
            let status =
                StatusCode::from_u16(code).map_err(malformed("Invalid response status code"))?;

            let mut response = Response::new(());
            *response.status_mut() = status;
            *response.version_mut() = version(res.version);
            *response.headers_mut() = header_map(res.headers)?;
            Ok(response)
        }
    }
}

fn header_map(raw: &[httparse::Header<'_>]) -> Result<HeaderMap, ParseError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for h in raw {
        let name = HeaderName::from_bytes(h.name.as_bytes()).map_err(malformed("Invalid header name"))?;
        let value = HeaderValue::from_bytes(h.value).map_err(malformed("Invalid header value"))?;
        // append keeps repeated headers in arrival order
        headers.append(name, value);
    }
    Ok(headers)
}

fn version(minor: Option<u8>) -> Version {
    match minor {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    }
}

fn malformed<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> ParseError {
    move |err| ParseError::Malformed(format!("{}: {}", context, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_read_request_with_body_and_duplicate_headers() {
        let raw: &'static [u8] = b"POST http://origin.test/req2 HTTP/1.1\r\n\
            Host: origin.test\r\n\
            X-Tag: one\r\n\
            X-Tag: two\r\n\
            Content-Length: 5\r\n\r\nHELLO";
        let mut reader = BufReader::new(raw);

        let request = read_request(&mut reader).await.unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri().path(), "/req2");
        assert_eq!(request.uri().host(), Some("origin.test"));
        let tags: Vec<_> = request.headers().get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["one", "two"]);
        assert_eq!(request.body().as_ref(), b"HELLO");
    }

    #[tokio::test]
    async fn test_read_request_on_empty_stream_is_end_of_stream() {
        let mut reader = BufReader::new(&b""[..]);

        let err = read_request(&mut reader).await.unwrap_err();

        assert!(err.is_end_of_stream());
    }

    #[tokio::test]
    async fn test_read_request_truncated_head_is_unexpected_eof() {
        let mut reader = BufReader::new(&b"GET http://origin.test/ HTTP/1.1\r\nHost: ori"[..]);

        let err = read_request(&mut reader).await.unwrap_err();

        assert!(err.is_unexpected_eof());
    }

    #[tokio::test]
    async fn test_read_request_truncated_body_is_unexpected_eof() {
        let raw: &'static [u8] =
            b"POST http://origin.test/ HTTP/1.1\r\nContent-Length: 10\r\n\r\nHELLO";
        let mut reader = BufReader::new(raw);

        let err = read_request(&mut reader).await.unwrap_err();

        assert!(err.is_unexpected_eof());
    }

    #[tokio::test]
    async fn test_read_request_rejects_garbage() {
        let mut reader = BufReader::new(&b"\x00\x01 not http\r\n\r\n"[..]);

        let err = read_request(&mut reader).await.unwrap_err();

        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_read_request_without_newline_stops_at_head_limit() {
        let mut reader = BufReader::new(tokio::io::repeat(b'A'));

        let err = tokio::time::timeout(Duration::from_secs(3), read_request(&mut reader))
            .await
            .expect("head limit should end the read")
            .unwrap_err();

        assert!(matches!(err, ParseError::Malformed(msg) if msg.contains("size limit")));
    }

    #[tokio::test]
    async fn test_read_request_with_oversized_header_line_is_rejected() {
        let mut raw = b"GET http://origin.test/ HTTP/1.1\r\nX-Big: ".to_vec();
        raw.extend_from_slice(&vec![b'b'; HEADER_SECTION_MAX_LENGTH]);
        raw.extend_from_slice(b"\r\n\r\n");
        let mut reader = BufReader::new(&raw[..]);

        let err = read_request(&mut reader).await.unwrap_err();

        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_read_response_head_on_empty_stream_is_unexpected_eof() {
        let mut reader = BufReader::new(&b""[..]);

        let err = read_response_head(&mut reader).await.unwrap_err();

        assert!(err.is_unexpected_eof());
    }

    #[tokio::test]
    async fn test_read_response_head_leaves_body() {
        let raw: &'static [u8] = b"HTTP/1.1 403 Forbidden\r\nContent-Length: 5\r\n\r\nHELLO";
        let mut reader = BufReader::new(raw);

        let response = read_response_head(&mut reader).await.unwrap();
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["content-length"], "5");
        assert_eq!(rest, b"HELLO");
    }
}
