use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::HOST;
use http::{Request, Response, Uri};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, info};

use super::{BodyStream, RequestHook, ResponseHook, Result, StreamContext, TunnelError};
use crate::adapters::http1::{write_response, Http1RequestParser};
use crate::adapters::{LogErrorSink, ReqwestHttpClient};
use crate::ports::{ErrorSink, HttpClientPort, RequestParser, StreamHandler, StreamPort};

/// Replays requests read off a stream against a real HTTP client.
///
/// Mounted on a transport as the [`StreamHandler`] for the tunnel's stream
/// name; every opened stream gets its own dispatch loop.
#[derive(Clone)]
pub struct TunnelServer {
    http_client: Arc<dyn HttpClientPort>,
    error_sink: Arc<dyn ErrorSink>,
    request_parser: Arc<dyn RequestParser>,
    request_hooks: Vec<RequestHook>,
    response_hooks: Vec<ResponseHook>,
}

impl TunnelServer {
    pub fn builder() -> TunnelServerBuilder {
        TunnelServerBuilder::default()
    }

    /// Serves `stream` until its peer stops sending requests or an exchange fails.
    ///
    /// The error that ended the loop, if any, goes to the error sink. The
    /// stream is closed before returning.
    pub async fn serve(&self, ctx: &StreamContext, stream: Arc<dyn StreamPort>) {
        match self.dispatch_loop(stream.as_ref()).await {
            Ok(exchanges) => debug!(stream = %ctx, exchanges, "stream finished"),
            Err(err) => self.error_sink.handle(ctx, &err),
        }
        if let Err(err) = stream.close() {
            debug!(stream = %ctx, "closing stream: {}", err);
        }
    }

    async fn dispatch_loop(&self, stream: &dyn StreamPort) -> Result<usize> {
        let mut exchanges = 0;
        loop {
            let mut reader = BufReader::new(stream.reader());
            let mut request = match self.request_parser.read_request(&mut reader).await {
                Ok(request) => request,
                Err(err) if err.is_end_of_stream() => return Ok(exchanges),
                Err(err) => return Err(TunnelError::RequestParseFailed(err)),
            };
            reader
                .into_inner()
                .close()
                .map_err(|err| TunnelError::RequestParseFailed(err.into()))?;

            for hook in &self.request_hooks {
                hook(&mut request);
            }
            let request = with_absolute_target(request)?;
            let method = request.method().clone();
            info!("{} {}", method, request.uri());

            let mut response = self.http_client.execute(request).await.map_err(|err| match err {
                err @ TunnelError::DispatchFailed(_) => err,
                other => TunnelError::DispatchFailed(other.to_string()),
            })?;
            for hook in &self.response_hooks {
                hook(&mut response);
            }

            let mut writer = stream.writer();
            write_response(&mut writer, response, &method)
                .await
                .map_err(TunnelError::ResponseWriteFailed)?;
            writer.shutdown().await.map_err(TunnelError::ResponseWriteFailed)?;
            exchanges += 1;

            if stream.is_closed() {
                return Ok(exchanges);
            }
        }
    }
}

#[async_trait]
impl StreamHandler for TunnelServer {
    async fn handle(&self, ctx: StreamContext, stream: Arc<dyn StreamPort>) {
        self.serve(&ctx, stream).await
    }
}

/// Rewrites an origin-form target into an absolute URL built from `Host`.
fn with_absolute_target(mut request: Request<Bytes>) -> Result<Request<Bytes>> {
    let uri = request.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Ok(request);
    }
    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| TunnelError::InvalidRequest(format!("no host for request target {}", uri)))?;
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let absolute: Uri = format!("http://{}{}", host, path)
        .parse()
        .map_err(|e: http::uri::InvalidUri| TunnelError::InvalidRequest(e.to_string()))?;
    *request.uri_mut() = absolute;
    Ok(request)
}

/// Typed configuration for a [`TunnelServer`].
///
/// Hooks run in the order they were added.
#[derive(Default)]
pub struct TunnelServerBuilder {
    http_client: Option<Arc<dyn HttpClientPort>>,
    error_sink: Option<Arc<dyn ErrorSink>>,
    request_parser: Option<Arc<dyn RequestParser>>,
    request_hooks: Vec<RequestHook>,
    response_hooks: Vec<ResponseHook>,
}

impl TunnelServerBuilder {
    pub fn http_client(mut self, client: Arc<dyn HttpClientPort>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    pub fn request_parser(mut self, parser: Arc<dyn RequestParser>) -> Self {
        self.request_parser = Some(parser);
        self
    }

    pub fn request_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Request<Bytes>) + Send + Sync + 'static,
    {
        self.request_hooks.push(Arc::new(hook));
        self
    }

    pub fn response_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Response<BodyStream>) + Send + Sync + 'static,
    {
        self.response_hooks.push(Arc::new(hook));
        self
    }

    /// Fails only when the default HTTP client cannot be constructed.
    pub fn build(self) -> Result<TunnelServer> {
        let http_client: Arc<dyn HttpClientPort> = match self.http_client {
            Some(client) => client,
            None => Arc::new(ReqwestHttpClient::new()?),
        };
        Ok(TunnelServer {
            http_client,
            error_sink: self.error_sink.unwrap_or_else(|| Arc::new(LogErrorSink::new())),
            request_parser: self.request_parser.unwrap_or_else(|| Arc::new(Http1RequestParser)),
            request_hooks: self.request_hooks,
            response_hooks: self.response_hooks,
        })
    }
}
