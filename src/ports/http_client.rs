use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};

use crate::domain::{BodyStream, Result};

/// Port for the real HTTP client that reaches the origin server
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// Send a request with an absolute target and return the origin's response.
    ///
    /// Retries and timeouts are the implementation's own policy.
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<BodyStream>>;
}
