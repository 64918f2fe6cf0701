use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::domain::{Result, StreamContext};

/// Read side of a stream. Reads return end-of-file at each end-of-message marker.
pub trait MessageRead: AsyncRead + Send + Unpin {
    /// Releases the current inbound message.
    ///
    /// Unread bytes up to the next end-of-message marker are discarded; the
    /// handle then continues with the following message.
    fn close(&mut self) -> io::Result<()>;
}

pub type StreamReader = Box<dyn MessageRead>;

/// Write side of a stream. `shutdown` marks the end of the outgoing message.
pub type StreamWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Port for looking up sessions on a multiplexed transport
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// Find a live session by its identifier
    async fn session(&self, id: Uuid) -> Result<Arc<dyn SessionPort>>;
}

/// One logical peer connection able to host many streams
#[async_trait]
pub trait SessionPort: Send + Sync {
    fn id(&self) -> Uuid;

    /// Open a new stream for the named sub-protocol
    async fn open_stream(&self, name: &str) -> Result<Arc<dyn StreamPort>>;
}

/// A bidirectional, ordered byte channel within a session
pub trait StreamPort: Send + Sync {
    fn name(&self) -> &str;

    /// Returns a new handle on the read side
    fn reader(&self) -> StreamReader;

    /// Returns a new handle on the write side
    fn writer(&self) -> StreamWriter;

    /// True once either end has closed the stream
    fn is_closed(&self) -> bool;

    /// Closes both sides. Calling it again has no effect.
    fn close(&self) -> io::Result<()>;
}

/// Serves streams opened by the remote peer for one stream name
#[async_trait]
pub trait StreamHandler: Send + Sync {
    async fn handle(&self, ctx: StreamContext, stream: Arc<dyn StreamPort>);
}
