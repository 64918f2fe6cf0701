//! Process-local multiplexed transport.
//!
//! Sessions and streams live in memory; opening a stream spawns the handler
//! registered for its name on a tokio task, the same way a network transport
//! dispatches remotely opened streams.

mod pipe;

pub use pipe::MemoryStream;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::domain::{Result, StreamContext, TunnelError};
use crate::ports::{SessionPort, StreamHandler, StreamPort, TransportPort};

type Handlers = Arc<RwLock<HashMap<String, Arc<dyn StreamHandler>>>>;

/// In-memory transport holding sessions and the stream handlers mounted on it.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<MemorySession>>>>,
    handlers: Handlers,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `handler` for every stream opened under `name`.
    pub async fn register_stream(&self, name: &str, handler: Arc<dyn StreamHandler>) {
        self.handlers.write().await.insert(name.to_string(), handler);
    }

    /// Join a new peer session and return its identifier.
    pub async fn open_session(&self) -> Uuid {
        let session = Arc::new(MemorySession {
            id: Uuid::new_v4(),
            handlers: self.handlers.clone(),
            closed: AtomicBool::new(false),
        });
        let id = session.id;
        self.sessions.write().await.insert(id, session);
        log::debug!("session {} opened", id);
        id
    }

    /// Drop a session; later lookups fail and held handles can no longer open streams.
    pub async fn close_session(&self, id: Uuid) -> bool {
        match self.sessions.write().await.remove(&id) {
            Some(session) => {
                session.closed.store(true, Ordering::Release);
                log::debug!("session {} closed", id);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TransportPort for MemoryTransport {
    async fn session(&self, id: Uuid) -> Result<Arc<dyn SessionPort>> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(&id).ok_or(TunnelError::SessionNotFound(id))?;
        Ok(session.clone())
    }
}

pub struct MemorySession {
    id: Uuid,
    handlers: Handlers,
    closed: AtomicBool,
}

#[async_trait]
impl SessionPort for MemorySession {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn open_stream(&self, name: &str) -> Result<Arc<dyn StreamPort>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TunnelError::StreamOpenFailed(format!("session {} is closed", self.id)));
        }
        let handler = self
            .handlers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TunnelError::StreamOpenFailed(format!("no handler for stream {}", name)))?;

        let (local, remote) = MemoryStream::pair(name);
        let ctx = StreamContext::new(self.id, name);
        let span = info_span!("stream", session = %self.id, name = %name);
        tokio::spawn(
            async move {
                handler.handle(ctx, Arc::new(remote)).await;
            }
            .instrument(span),
        );
        log::debug!("stream {} opened on session {}", name, self.id);
        Ok(Arc::new(local))
    }
}
