use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;

use crate::adapters::http1::is_hop_by_hop;
use crate::adapters::reqwest_client::DEFAULT_HTTP_TIMEOUT;
use crate::domain::{BodyStream, Result, TunnelError};
use crate::ports::HttpClientPort;

/// Real HTTP client on hyper's pooled connection client.
///
/// Unlike [`ReqwestHttpClient`](crate::adapters::ReqwestHttpClient) it never
/// retries; `timeout` bounds the wait for the response head.
pub struct HyperHttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl HyperHttpClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .http1_title_case_headers(true)
            .http1_preserve_header_case(true)
            .build_http();
        Self { client, timeout }
    }
}

impl Default for HyperHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClientPort for HyperHttpClient {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<BodyStream>> {
        let (mut parts, body) = request.into_parts();
        parts.headers = parts
            .headers
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let hyper_req = Request::from_parts(parts, Full::new(body));

        let hyper_resp = timeout(self.timeout, self.client.request(hyper_req))
            .await
            .map_err(|_| TunnelError::DispatchFailed(format!("no response within {:?}", self.timeout)))?
            .map_err(|e| TunnelError::DispatchFailed(format!("{}", e)))?;

        let (parts, body) = hyper_resp.into_parts();
        let body: BodyStream = Box::pin(body.into_data_stream().map_err(io::Error::other));
        Ok(Response::from_parts(parts, body))
    }
}
