//! Request gate: configuration, secret, declared size, then rate limit.
//!
//! Runs after the CORS layer has answered preflight, so every request seen
//! here is a real proxy call. Nothing is forwarded, authenticated or counted
//! while the configuration is incomplete.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::proxy::audit;
use crate::proxy::config::ProxyConfig;
use crate::proxy::error::{ProxyError, Result};
use crate::proxy::rate_limit::{client_identifier, Decision, RateLimiter};
use crate::proxy::security;
use crate::proxy::server::AppState;

/// Declared body length, if the header is present and parses.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Reject a request whose declared `Content-Length` exceeds `ceiling`.
///
/// Only the header is inspected. A caller that omits `Content-Length`
/// (chunked uploads) is not caught here; the body reader's transport cap is
/// the only bound on such requests.
pub fn size_guard(headers: &HeaderMap, ceiling: u64) -> Result<()> {
    match declared_length(headers) {
        Some(declared) if declared > ceiling => Err(ProxyError::PayloadTooLarge {
            declared,
            limit: ceiling,
        }),
        _ => Ok(()),
    }
}

/// Run every gate check in order, returning the limiter decision.
pub fn admit(
    config: &ProxyConfig,
    limiter: &RateLimiter,
    headers: &HeaderMap,
    client: &str,
) -> Result<Decision> {
    config.validate()?;
    security::authenticate(headers, &config.secret)?;
    size_guard(headers, config.max_payload_bytes)?;
    limiter.check(client)
}

pub async fn auth_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_identifier(request.headers(), peer);
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    match admit(&state.config, &state.rate_limiter, request.headers(), &client) {
        Ok(decision) => {
            audit::log_admitted(&client, &method, &path, decision.count);
            next.run(request).await
        }
        Err(err) => {
            audit::log_rejected(&client, &method, &path, err.status().as_u16(), err.label());
            err.into_response()
        }
    }
}
