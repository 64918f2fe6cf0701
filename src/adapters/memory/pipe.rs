use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::ports::{MessageRead, StreamPort, StreamReader, StreamWriter};

#[derive(Debug)]
enum Frame {
    Data(Bytes),
    EndOfMessage,
}

struct Inbound {
    rx: Option<UnboundedReceiver<Frame>>,
    pending: Bytes,
    /// The current message's end marker has been received.
    message_done: bool,
    /// Skip the rest of the current message on the next read.
    discard: bool,
}

struct Shared {
    name: String,
    closed: AtomicBool,
    outbound: Mutex<Option<UnboundedSender<Frame>>>,
    inbound: Mutex<Inbound>,
}

impl Shared {
    fn inbound(&self) -> io::Result<MutexGuard<'_, Inbound>> {
        self.inbound.lock().map_err(|_| poisoned())
    }

    fn outbound(&self) -> io::Result<MutexGuard<'_, Option<UnboundedSender<Frame>>>> {
        self.outbound.lock().map_err(|_| poisoned())
    }

    fn send(&self, frame: Frame) -> io::Result<()> {
        let outbound = self.outbound()?;
        let tx = outbound
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "stream closed"))?;
        tx.send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer closed the stream"))
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "stream state poisoned")
}

/// One end of an in-process stream.
///
/// Bytes travel as data frames; shutting a writer down sends an end-of-message
/// frame, which the peer's reader reports as end-of-file.
#[derive(Clone)]
pub struct MemoryStream {
    shared: Arc<Shared>,
}

impl MemoryStream {
    /// Creates two connected ends of a stream.
    pub fn pair(name: &str) -> (MemoryStream, MemoryStream) {
        let (a_tx, b_rx) = unbounded_channel();
        let (b_tx, a_rx) = unbounded_channel();
        (Self::end(name, a_tx, a_rx), Self::end(name, b_tx, b_rx))
    }

    fn end(name: &str, tx: UnboundedSender<Frame>, rx: UnboundedReceiver<Frame>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.to_string(),
                closed: AtomicBool::new(false),
                outbound: Mutex::new(Some(tx)),
                inbound: Mutex::new(Inbound {
                    rx: Some(rx),
                    pending: Bytes::new(),
                    message_done: false,
                    discard: false,
                }),
            }),
        }
    }
}

impl StreamPort for MemoryStream {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn reader(&self) -> StreamReader {
        Box::new(MemoryReader {
            shared: self.shared.clone(),
        })
    }

    fn writer(&self) -> StreamWriter {
        Box::new(MemoryWriter {
            shared: self.shared.clone(),
            shut_down: false,
        })
    }

    fn is_closed(&self) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            return true;
        }
        match self.shared.outbound.lock() {
            Ok(outbound) => outbound.as_ref().map_or(true, |tx| tx.is_closed()),
            Err(_) => true,
        }
    }

    fn close(&self) -> io::Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Receiver first: by the time the peer reads end-of-stream, its writes already fail.
        self.shared.inbound()?.rx = None;
        self.shared.outbound()?.take();
        Ok(())
    }
}

struct MemoryReader {
    shared: Arc<Shared>,
}

impl AsyncRead for MemoryReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let mut inbound = self.shared.inbound()?;
        loop {
            if inbound.discard {
                inbound.pending.clear();
                if inbound.message_done {
                    inbound.message_done = false;
                    inbound.discard = false;
                    continue;
                }
            } else if !inbound.pending.is_empty() {
                let n = inbound.pending.len().min(buf.remaining());
                let chunk = inbound.pending.split_to(n);
                buf.put_slice(&chunk);
                return Poll::Ready(Ok(()));
            } else if inbound.message_done {
                return Poll::Ready(Ok(()));
            }

            let frame = match inbound.rx.as_mut() {
                Some(rx) => match rx.poll_recv(cx) {
                    Poll::Ready(frame) => frame,
                    Poll::Pending => return Poll::Pending,
                },
                None => return Poll::Ready(Ok(())),
            };
            match frame {
                Some(Frame::Data(bytes)) => inbound.pending = bytes,
                Some(Frame::EndOfMessage) => inbound.message_done = true,
                None => {
                    inbound.rx = None;
                    return Poll::Ready(Ok(()));
                }
            }
        }
    }
}

impl MessageRead for MemoryReader {
    fn close(&mut self) -> io::Result<()> {
        self.shared.inbound()?.discard = true;
        Ok(())
    }
}

struct MemoryWriter {
    shared: Arc<Shared>,
    shut_down: bool,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        self.shared.send(Frame::Data(Bytes::copy_from_slice(buf)))?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.shut_down {
            return Poll::Ready(Ok(()));
        }
        self.shared.send(Frame::EndOfMessage)?;
        self.shut_down = true;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn send_message(stream: &MemoryStream, data: &[u8]) {
        let mut writer = stream.writer();
        writer.write_all(data).await.unwrap();
        writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_end_of_message_reads_as_eof() {
        let (client, server) = MemoryStream::pair("tunnel");
        send_message(&client, b"first").await;
        send_message(&client, b"second").await;

        let mut reader = server.reader();
        let mut first = Vec::new();
        reader.read_to_end(&mut first).await.unwrap();
        reader.close().unwrap();
        let mut second = Vec::new();
        reader.read_to_end(&mut second).await.unwrap();

        assert_eq!(first, b"first");
        assert_eq!(second, b"second");
    }

    #[tokio::test]
    async fn test_close_discards_unread_message_bytes() {
        let (client, server) = MemoryStream::pair("tunnel");
        send_message(&client, b"ignored tail").await;
        send_message(&client, b"next").await;

        let mut reader = server.reader();
        let mut head = [0u8; 7];
        reader.read_exact(&mut head).await.unwrap();
        reader.close().unwrap();
        let mut next = Vec::new();
        reader.read_to_end(&mut next).await.unwrap();

        assert_eq!(&head, b"ignored");
        assert_eq!(next, b"next");
    }

    #[tokio::test]
    async fn test_peer_close_ends_stream_and_breaks_writes() {
        let (client, server) = MemoryStream::pair("tunnel");
        assert!(!client.is_closed());

        server.close().unwrap();
        server.close().unwrap();

        let mut buf = Vec::new();
        assert_eq!(client.reader().read_to_end(&mut buf).await.unwrap(), 0);
        assert!(client.is_closed());
        let err = client.writer().write_all(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
