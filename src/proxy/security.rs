//! Shared-secret authentication.
//!
//! The web client presents the secret in `x-proxy-secret`, or failing that in
//! `Authorization`. The value must match the configured secret exactly; the
//! comparison runs in constant time so response timing does not leak a
//! matching prefix.

use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::proxy::error::{ProxyError, Result};

/// Dedicated header carrying the shared secret.
pub const SECRET_HEADER: &str = "x-proxy-secret";

/// Constant-time comparison of two byte strings.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// The presented secret: dedicated header first, then `Authorization`.
fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SECRET_HEADER)
        .or_else(|| headers.get(header::AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
}

/// Check the request's secret against the configured one.
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<()> {
    match presented_secret(headers) {
        Some(value) if constant_time_eq(value.as_bytes(), secret.as_bytes()) => Ok(()),
        Some(_) => {
            warn!("Invalid proxy secret");
            Err(ProxyError::Unauthorized)
        }
        None => {
            warn!("Missing proxy secret");
            Err(ProxyError::Unauthorized)
        }
    }
}
