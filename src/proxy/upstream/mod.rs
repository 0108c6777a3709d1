// Upstream module - outbound request building and forwarding

pub mod client;
pub mod request;

pub use client::{UpstreamClient, UpstreamResponse};
pub use request::{build_outbound, OutboundRequest};
