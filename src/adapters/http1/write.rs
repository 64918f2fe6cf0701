use std::io;

use futures::StreamExt;
use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{request, HeaderMap, Method, Response, StatusCode, Version};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{content_length_hint, is_hop_by_hop};
use crate::domain::{Body, BodyStream};

/// Writes `parts` and `body` with the request line in absolute form, suitable for proxying.
///
/// The body is consumed and dropped once written.
pub async fn write_proxy_request<W>(writer: &mut W, parts: &request::Parts, body: Body) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let authority = match (parts.uri.scheme(), parts.uri.authority()) {
        (Some(_), Some(authority)) => authority.as_str().to_string(),
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("request target must be an absolute URL, got {}", parts.uri),
            ))
        }
    };

    let mut head = format!("{} {} {}\r\n", parts.method, parts.uri, version_str(parts.version)).into_bytes();
    if !parts.headers.contains_key(HOST) {
        head.extend_from_slice(format!("Host: {}\r\n", authority).as_bytes());
    }
    write_headers(&mut head, &parts.headers, |name| {
        *name == CONTENT_LENGTH || *name == TRANSFER_ENCODING
    });

    let length = body.length();
    match length {
        Some(0) if !expects_body(&parts.method) => {}
        Some(n) => head.extend_from_slice(format!("Content-Length: {}\r\n", n).as_bytes()),
        None => head.extend_from_slice(b"Transfer-Encoding: chunked\r\n"),
    }
    head.extend_from_slice(b"\r\n");

    writer.write_all(&head).await?;
    write_body(writer, body.into_stream(), length).await?;
    writer.flush().await
}

/// Writes an origin response back onto a stream.
///
/// Framing headers are regenerated: the declared `Content-Length` is kept when
/// present, otherwise the body is sent chunked. Responses that carry no body
/// for `method` are written head-only with their headers untouched.
pub async fn write_response<W>(writer: &mut W, response: Response<BodyStream>, method: &Method) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let (parts, body) = response.into_parts();
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        parts.status.as_u16(),
        parts.status.canonical_reason().unwrap_or("")
    )
    .into_bytes();

    if is_bodiless(method, parts.status) {
        write_headers(&mut head, &parts.headers, |name| *name == TRANSFER_ENCODING);
        head.extend_from_slice(b"\r\n");
        writer.write_all(&head).await?;
        return writer.flush().await;
    }

    let length = content_length_hint(&parts.headers);
    write_headers(&mut head, &parts.headers, is_hop_by_hop);
    match length {
        Some(n) => head.extend_from_slice(format!("Content-Length: {}\r\n", n).as_bytes()),
        None => head.extend_from_slice(b"Transfer-Encoding: chunked\r\n"),
    }
    head.extend_from_slice(b"\r\n");

    writer.write_all(&head).await?;
    write_body(writer, body, length).await?;
    writer.flush().await
}

fn write_headers(head: &mut Vec<u8>, headers: &HeaderMap, skip: impl Fn(&http::HeaderName) -> bool) {
    for (name, value) in headers.iter() {
        if skip(name) {
            continue;
        }
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
}

/// Streams `body`, raw when `length` is declared and chunk-encoded otherwise.
async fn write_body<W>(writer: &mut W, mut body: BodyStream, length: Option<u64>) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        written += chunk.len() as u64;
        match length {
            Some(n) if written > n => return Err(length_mismatch(n, written)),
            Some(_) => writer.write_all(&chunk).await?,
            None => {
                writer.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await?;
                writer.write_all(&chunk).await?;
                writer.write_all(b"\r\n").await?;
            }
        }
    }
    match length {
        Some(n) if n != written => Err(length_mismatch(n, written)),
        Some(_) => Ok(()),
        None => writer.write_all(b"0\r\n\r\n").await,
    }
}

fn length_mismatch(declared: u64, actual: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("body length {} does not match declared length {}", actual, declared),
    )
}

fn expects_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

fn is_bodiless(method: &Method, status: StatusCode) -> bool {
    *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    }
}
