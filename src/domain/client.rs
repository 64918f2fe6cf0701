use std::future::Future;
use std::sync::Arc;

use http::{Request, Response};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::debug;
use uuid::Uuid;

use super::{Body, ClosingBody, DispatchTarget, Result, TunnelError};
use crate::adapters::http1::{write_proxy_request, BodyReader, Framing, Http1ResponseParser};
use crate::ports::{ResponseParser, StreamPort, StreamReader, StreamWriter, TransportPort};

/// Sends HTTP requests through streams of a multiplexed transport.
#[derive(Clone)]
pub struct TunnelClient {
    transport: Arc<dyn TransportPort>,
    stream_name: String,
    response_parser: Arc<dyn ResponseParser>,
}

impl TunnelClient {
    pub fn new(transport: Arc<dyn TransportPort>, stream_name: impl Into<String>) -> Self {
        Self {
            transport,
            stream_name: stream_name.into(),
            response_parser: Arc::new(Http1ResponseParser),
        }
    }

    pub fn with_response_parser(mut self, parser: Arc<dyn ResponseParser>) -> Self {
        self.response_parser = parser;
        self
    }

    /// Sends `request` to wherever `target` points and reads the response head.
    ///
    /// With a session target a new stream carries this one exchange and is
    /// closed together with the returned body. With a bound stream the body
    /// only releases the current message; the transaction keeps the stream.
    pub async fn execute(&self, target: DispatchTarget, request: Request<Body>) -> Result<Response<ClosingBody>> {
        match target {
            DispatchTarget::Session(session_id) => {
                let stream = self.open_stream(session_id).await?;
                let guard = StreamGuard::new(stream.clone());
                debug!(session = %session_id, "{} {}", request.method(), request.uri());
                let response = self
                    .round_trip(stream.reader(), stream.writer(), request, Some(stream))
                    .await?;
                guard.disarm();
                Ok(response)
            }
            DispatchTarget::BoundStream { reader, writer } => {
                self.round_trip(reader, writer, request, None).await
            }
            DispatchTarget::Unbound => Err(TunnelError::NoTransportBound),
        }
    }

    /// Opens one stream on the session and hands it to `f` as a [`Transaction`].
    ///
    /// Requests sent through [`Transaction::target`] share the stream and must
    /// be issued one after another. The stream is closed once `f` completes,
    /// whatever its outcome.
    pub async fn run_transaction<F, Fut, T>(&self, session_id: Uuid, f: F) -> Result<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let stream = self.open_stream(session_id).await?;
        let _guard = StreamGuard::new(stream.clone());
        debug!(session = %session_id, "transaction started on stream {}", stream.name());
        f(Transaction { stream }).await
    }

    async fn open_stream(&self, session_id: Uuid) -> Result<Arc<dyn StreamPort>> {
        let session = self.transport.session(session_id).await?;
        session.open_stream(&self.stream_name).await
    }

    async fn round_trip(
        &self,
        reader: StreamReader,
        mut writer: StreamWriter,
        request: Request<Body>,
        owned_stream: Option<Arc<dyn StreamPort>>,
    ) -> Result<Response<ClosingBody>> {
        let (parts, body) = request.into_parts();
        write_proxy_request(&mut writer, &parts, body)
            .await
            .map_err(TunnelError::RequestWriteFailed)?;
        writer.shutdown().await.map_err(TunnelError::RequestWriteFailed)?;

        let mut reader = BufReader::new(reader);
        let parsed = self
            .response_parser
            .read_response_head(&mut reader, &parts.method)
            .await
            .and_then(|head| {
                let framing = Framing::for_response(&parts.method, head.status(), head.headers())?;
                Ok((head, framing))
            });
        let (head, framing) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                // Skip what is left of the bad response so a transaction can go on.
                if let Err(close_err) = reader.into_inner().close() {
                    debug!("releasing unread response: {}", close_err);
                }
                return Err(TunnelError::ResponseParseFailed(err));
            }
        };

        let body = ClosingBody::new(BodyReader::new(reader, framing), owned_stream);
        Ok(head.map(|()| body))
    }
}

/// A stream held open across several exchanges.
///
/// Each response body must be closed or dropped before the next request is
/// sent on the same transaction.
#[derive(Clone)]
pub struct Transaction {
    stream: Arc<dyn StreamPort>,
}

impl Transaction {
    /// Dispatch target bound to this transaction's stream.
    pub fn target(&self) -> DispatchTarget {
        DispatchTarget::BoundStream {
            reader: self.stream.reader(),
            writer: self.stream.writer(),
        }
    }

    pub fn stream(&self) -> &Arc<dyn StreamPort> {
        &self.stream
    }
}

/// Closes a stream on drop unless disarmed.
struct StreamGuard {
    stream: Option<Arc<dyn StreamPort>>,
}

impl StreamGuard {
    fn new(stream: Arc<dyn StreamPort>) -> Self {
        Self { stream: Some(stream) }
    }

    fn disarm(mut self) {
        self.stream = None;
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.close() {
                debug!("closing stream {}: {}", stream.name(), err);
            }
        }
    }
}
