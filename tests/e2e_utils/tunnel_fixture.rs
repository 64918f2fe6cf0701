#![cfg(test)]
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use wire_http_tunnel::adapters::{MemoryTransport, ReqwestHttpClient};
use wire_http_tunnel::domain::{StreamContext, TunnelError};
use wire_http_tunnel::{TunnelClient, TunnelServer, TunnelServerBuilder};

pub const STREAM_NAME: &str = "tunnel";

/// Both halves of a tunnel joined by an in-memory transport session.
pub struct TunnelFixture {
    pub transport: MemoryTransport,
    pub client: TunnelClient,
    pub session_id: Uuid,
    errors: Arc<Mutex<Vec<String>>>,
}

impl TunnelFixture {
    /// Mounts the server built from `builder`, with its errors recorded.
    pub async fn start(builder: TunnelServerBuilder) -> Self {
        let errors: Arc<Mutex<Vec<String>>> = Arc::default();
        let recorder = errors.clone();
        let sink = move |_ctx: &StreamContext, err: &TunnelError| recorder.lock().unwrap().push(err.to_string());
        let server = builder.error_sink(Arc::new(sink)).build().expect("Failed to build tunnel server");

        let transport = MemoryTransport::new();
        transport.register_stream(STREAM_NAME, Arc::new(server)).await;
        let session_id = transport.open_session().await;
        let client = TunnelClient::new(Arc::new(transport.clone()), STREAM_NAME);

        Self {
            transport,
            client,
            session_id,
            errors,
        }
    }

    /// Server dispatching through reqwest with a single quick retry.
    pub async fn with_reqwest() -> Self {
        let http_client = ReqwestHttpClient::with_settings(1, Duration::from_secs(10))
            .expect("Failed to build reqwest client")
            .with_retry_backoff(Duration::from_millis(10));
        Self::start(TunnelServer::builder().http_client(Arc::new(http_client))).await
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}
