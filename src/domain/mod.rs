pub mod client;
pub mod closing_body;
pub mod errors;
pub mod models;
pub mod server;

pub use client::{Transaction, TunnelClient};
pub use closing_body::ClosingBody;
pub use errors::*;
pub use models::*;
pub use server::{TunnelServer, TunnelServerBuilder};
