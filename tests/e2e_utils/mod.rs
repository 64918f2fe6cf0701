#![cfg(test)]
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod origin_server;
pub mod tunnel_fixture;

pub use origin_server::{ObservedRequest, TestOriginServer};
pub use tunnel_fixture::TunnelFixture;
