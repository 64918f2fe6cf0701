pub mod http1;
pub mod hyper_client;
pub mod logging;
pub mod memory;
pub mod reqwest_client;

pub use http1::{Http1RequestParser, Http1ResponseParser};
pub use hyper_client::HyperHttpClient;
pub use logging::LogErrorSink;
pub use memory::{MemorySession, MemoryStream, MemoryTransport};
pub use reqwest_client::{ReqwestHttpClient, DEFAULT_HTTP_TIMEOUT, DEFAULT_RETRY_COUNT};
