use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http::header::HOST;
use http::{HeaderMap, Request, Response};
use tracing::{debug, warn};

use crate::adapters::http1::is_hop_by_hop;
use crate::domain::{BodyStream, Result, TunnelError};
use crate::ports::HttpClientPort;

pub const DEFAULT_RETRY_COUNT: u32 = 10;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Real HTTP client backed by reqwest, with a bounded retry count and an overall timeout.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    retry_count: u32,
    retry_backoff: Duration,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_settings(DEFAULT_RETRY_COUNT, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_settings(retry_count: u32, timeout: Duration) -> Result<Self> {
        // Explicitly disable system proxies: the tunnel is the only hop
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| TunnelError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry_count,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        })
    }

    /// Base delay between attempts; the n-th retry waits n times this long.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    fn build_request(&self, request: &Request<Bytes>) -> Result<reqwest::Request> {
        self.client
            .request(request.method().clone(), request.uri().to_string())
            .headers(forwarded_headers(request.headers()))
            .body(request.body().clone())
            .build()
            .map_err(|e| TunnelError::InvalidRequest(format!("{}", e)))
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttpClient {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<BodyStream>> {
        let mut attempt = 0;
        let http_response = loop {
            let req = self.build_request(&request)?;
            match self.client.execute(req).await {
                Ok(res) => break res,
                Err(e) if attempt < self.retry_count && is_retryable(&e) => {
                    attempt += 1;
                    warn!(attempt, "retrying {} {}: {}", request.method(), request.uri(), e);
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(TunnelError::DispatchFailed(format!("HTTP request failed: {}", e))),
            }
        };
        debug!(status = %http_response.status(), "{} {}", request.method(), request.uri());

        let status = http_response.status();
        let version = http_response.version();
        let headers = http_response.headers().clone();
        let body: BodyStream = Box::pin(http_response.bytes_stream().map_err(io::Error::other));

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.version_mut() = version;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}

/// Request headers minus `Host` and hop-by-hop headers, which reqwest regenerates.
fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| **name != HOST && !is_hop_by_hop(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
