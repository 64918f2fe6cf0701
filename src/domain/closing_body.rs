use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, BufReader, ReadBuf};

use crate::adapters::http1::BodyReader;
use crate::ports::{StreamPort, StreamReader};

/// Response body that releases the stream beneath it when closed.
///
/// Closing finishes the parsed body, then closes the stream's read side, then
/// the stream itself when this body owns it (one stream per request). Only the
/// first close has any effect; dropping the body closes it.
pub struct ClosingBody {
    body: BodyReader<BufReader<StreamReader>>,
    stream: Option<Arc<dyn StreamPort>>,
    closed: bool,
}

impl ClosingBody {
    pub fn new(body: BodyReader<BufReader<StreamReader>>, stream: Option<Arc<dyn StreamPort>>) -> Self {
        Self {
            body,
            stream,
            closed: false,
        }
    }

    pub fn owns_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.body.finish();
        let reader_result = self.body.get_mut().get_mut().close();
        let stream_result = match self.stream.take() {
            Some(stream) => stream.close(),
            None => Ok(()),
        };
        reader_result.and(stream_result)
    }
}

impl AsyncRead for ClosingBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.body).poll_read(cx, buf)
    }
}

impl Drop for ClosingBody {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::debug!("closing response body: {}", err);
        }
    }
}

impl fmt::Debug for ClosingBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosingBody")
            .field("owns_stream", &self.owns_stream())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http1::Framing;
    use crate::adapters::MemoryStream;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn send_message(stream: &MemoryStream, data: &[u8]) {
        let mut writer = stream.writer();
        writer.write_all(data).await.unwrap();
        writer.shutdown().await.unwrap();
    }

    fn body_over(stream: &MemoryStream, length: u64, owned: bool) -> ClosingBody {
        let owner: Option<Arc<dyn StreamPort>> = if owned { Some(Arc::new(stream.clone())) } else { None };
        ClosingBody::new(
            BodyReader::new(BufReader::new(stream.reader()), Framing::Length(length)),
            owner,
        )
    }

    #[tokio::test]
    async fn test_owned_close_tears_down_stream_once() {
        let (local, remote) = MemoryStream::pair("tunnel");
        send_message(&remote, b"HELLO").await;

        let mut body = body_over(&local, 5, true);
        let mut out = Vec::new();
        body.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"HELLO");

        body.close().unwrap();
        body.close().unwrap();

        assert!(body.is_closed());
        assert!(!body.owns_stream());
        assert!(local.is_closed());
        let mut rest = Vec::new();
        assert_eq!(remote.reader().read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_borrowed_close_keeps_stream_for_next_message() {
        let (local, remote) = MemoryStream::pair("tunnel");
        send_message(&remote, b"HELLO and trailing junk").await;
        send_message(&remote, b"next").await;

        let mut body = body_over(&local, 5, false);
        let mut first = [0u8; 2];
        body.read_exact(&mut first).await.unwrap();
        drop(body);

        assert!(!local.is_closed());
        let mut next = Vec::new();
        local.reader().read_to_end(&mut next).await.unwrap();
        assert_eq!(next, b"next");
    }

    #[tokio::test]
    async fn test_reads_after_close_report_eof() {
        let (local, remote) = MemoryStream::pair("tunnel");
        send_message(&remote, b"HELLO").await;

        let mut body = body_over(&local, 5, true);
        body.close().unwrap();

        let mut out = Vec::new();
        assert_eq!(body.read_to_end(&mut out).await.unwrap(), 0);
    }
}
