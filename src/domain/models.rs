use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream};
use http::{Request, Response};
use uuid::Uuid;

use crate::ports::{StreamReader, StreamWriter};

/// Streamed message body, as produced by a real HTTP client.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Runs against every request before it is dispatched to the origin.
pub type RequestHook = Arc<dyn Fn(&mut Request<Bytes>) + Send + Sync>;

/// Runs against every origin response before it is written back to the stream.
pub type ResponseHook = Arc<dyn Fn(&mut Response<BodyStream>) + Send + Sync>;

/// Identifies the stream a handler is serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamContext {
    pub session_id: Uuid,
    pub stream_name: String,
}

impl StreamContext {
    pub fn new(session_id: Uuid, stream_name: impl Into<String>) -> Self {
        Self {
            session_id,
            stream_name: stream_name.into(),
        }
    }
}

impl fmt::Display for StreamContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.stream_name)
    }
}

/// Outgoing request body handed to the tunnel client.
pub enum Body {
    Empty,
    Full(Bytes),
    Streaming {
        stream: BodyStream,
        length: Option<u64>,
    },
}

impl Body {
    pub fn empty() -> Self {
        Body::Empty
    }

    pub fn from_stream<S>(stream: S, length: Option<u64>) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Body::Streaming {
            stream: Box::pin(stream),
            length,
        }
    }

    /// Number of bytes the body will yield, when known up front.
    pub fn length(&self) -> Option<u64> {
        match self {
            Body::Empty => Some(0),
            Body::Full(bytes) => Some(bytes.len() as u64),
            Body::Streaming { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.length() == Some(0)
    }

    pub fn into_stream(self) -> BodyStream {
        match self {
            Body::Empty => Box::pin(stream::empty::<io::Result<Bytes>>()),
            Body::Full(bytes) => Box::pin(stream::once(async move { Ok::<_, io::Error>(bytes) })),
            Body::Streaming { stream, .. } => stream,
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Empty
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => write!(f, "Body::Empty"),
            Body::Full(bytes) => write!(f, "Body::Full({} bytes)", bytes.len()),
            Body::Streaming { length, .. } => write!(f, "Body::Streaming(length={:?})", length),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Full(Bytes::from(bytes))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Full(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Full(Bytes::from(s))
    }
}

/// Where the tunnel client sends a request.
pub enum DispatchTarget {
    /// Open a fresh stream on the session for this one exchange.
    Session(Uuid),
    /// Reuse the stream of an open transaction.
    BoundStream {
        reader: StreamReader,
        writer: StreamWriter,
    },
    Unbound,
}

impl From<Uuid> for DispatchTarget {
    fn from(session_id: Uuid) -> Self {
        DispatchTarget::Session(session_id)
    }
}

impl fmt::Debug for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchTarget::Session(id) => write!(f, "DispatchTarget::Session({})", id),
            DispatchTarget::BoundStream { .. } => write!(f, "DispatchTarget::BoundStream"),
            DispatchTarget::Unbound => write!(f, "DispatchTarget::Unbound"),
        }
    }
}
