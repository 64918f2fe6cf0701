//! HTTP tunneling over the streams of a multiplexed transport.
//!
//! A [`TunnelClient`] writes requests onto streams opened on a transport
//! session; the peer mounts a [`TunnelServer`] on the same stream name, which
//! replays every request against a real HTTP client and writes the response
//! back onto the stream.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;

pub use config::TunnelConfig;
pub use domain::{
    Body, ClosingBody, DispatchTarget, Transaction, TunnelClient, TunnelError, TunnelServer, TunnelServerBuilder,
};
