// proxy module - secret-gated forwarding proxy

pub mod audit;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod security;
pub mod server;

pub mod mappers;           // Upstream response envelope
pub mod handlers;          // Endpoint handlers
pub mod middleware;        // Axum middleware (CORS, gate)
pub mod upstream;          // Outbound request building and dispatch
pub mod common;            // Common utilities

pub use config::{CredentialMode, ProxyConfig};
pub use error::{ProxyError, Result};
pub use rate_limit::RateLimiter;
pub use server::{build_router, AppState, AxumServer};
