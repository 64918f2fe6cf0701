pub mod error_sink;
pub mod framing;
pub mod http_client;
pub mod transport;

pub use error_sink::ErrorSink;
pub use framing::{MessageBufRead, RequestParser, ResponseParser};
pub use http_client::HttpClientPort;
pub use transport::{
    MessageRead, SessionPort, StreamHandler, StreamPort, StreamReader, StreamWriter, TransportPort,
};
