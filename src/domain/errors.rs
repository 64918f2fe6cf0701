use std::fmt;
use std::io;

use uuid::Uuid;

/// Failure while decoding an HTTP/1.1 message off a stream.
#[derive(Debug)]
pub enum ParseError {
    /// The stream ended before the first byte of a message.
    EndOfStream,
    /// The stream ended in the middle of a message.
    UnexpectedEof,
    Malformed(String),
    Io(io::Error),
}

impl ParseError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, ParseError::EndOfStream)
    }

    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self, ParseError::UnexpectedEof)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::EndOfStream => write!(f, "end of stream"),
            ParseError::UnexpectedEof => write!(f, "unexpected end of stream"),
            ParseError::Malformed(msg) => write!(f, "Malformed message: {}", msg),
            ParseError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ParseError::UnexpectedEof
        } else {
            ParseError::Io(err)
        }
    }
}

#[derive(Debug)]
pub enum TunnelError {
    SessionNotFound(Uuid),
    StreamOpenFailed(String),
    /// The request was dispatched with neither a session nor a bound stream.
    NoTransportBound,
    RequestWriteFailed(io::Error),
    ResponseWriteFailed(io::Error),
    RequestParseFailed(ParseError),
    ResponseParseFailed(ParseError),
    DispatchFailed(String),
    InvalidRequest(String),
    Config(String),
}

impl TunnelError {
    /// True when the response could not be read because the stream ended early.
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self, TunnelError::ResponseParseFailed(err) if err.is_unexpected_eof())
    }
}

impl fmt::Display for TunnelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelError::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            TunnelError::StreamOpenFailed(msg) => write!(f, "Failed to open stream: {}", msg),
            TunnelError::NoTransportBound => {
                write!(f, "Request is bound to neither a session nor a transaction")
            }
            TunnelError::RequestWriteFailed(err) => write!(f, "Failed to write request: {}", err),
            TunnelError::ResponseWriteFailed(err) => write!(f, "Failed to write response: {}", err),
            TunnelError::RequestParseFailed(err) => write!(f, "Failed to read request: {}", err),
            TunnelError::ResponseParseFailed(err) => write!(f, "Failed to read response: {}", err),
            TunnelError::DispatchFailed(msg) => write!(f, "Dispatch failed: {}", msg),
            TunnelError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            TunnelError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for TunnelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TunnelError::RequestWriteFailed(err) | TunnelError::ResponseWriteFailed(err) => Some(err),
            TunnelError::RequestParseFailed(err) | TunnelError::ResponseParseFailed(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TunnelError>;
