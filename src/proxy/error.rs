//! Proxy failure kinds and their client-visible mapping.
//!
//! Every stage of the pipeline returns [`ProxyError`]; the `IntoResponse`
//! impl is the only place a failure becomes a status code and body.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Proxy misconfigured: {0}")]
    Configuration(String),

    #[error("Missing or invalid proxy secret")]
    Unauthorized,

    #[error("Rate limit exceeded for {client}")]
    RateLimited { client: String, retry_after_secs: u64 },

    #[error("Declared payload of {declared} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { declared: u64, limit: u64 },

    #[error("Upstream did not respond within {}ms", .timeout.as_millis())]
    UpstreamTimeout { timeout: Duration },

    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Internal proxy error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Configuration(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short, stable label used as the `error` field.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Proxy is not configured",
            Self::Unauthorized => "Unauthorized",
            Self::RateLimited { .. } => "Too many requests",
            Self::PayloadTooLarge { .. } => "Payload too large",
            Self::UpstreamTimeout { .. } => "Upstream timed out",
            Self::UpstreamUnreachable(_) => "Upstream unreachable",
            Self::Internal(_) => "Internal proxy error",
        }
    }

    /// Diagnostic text safe to hand back to the caller.
    pub fn details(&self) -> Option<String> {
        match self {
            Self::Unauthorized => None,
            Self::Configuration(msg) => Some(msg.clone()),
            Self::RateLimited {
                retry_after_secs, ..
            } => Some(format!("retry after {}s", retry_after_secs)),
            Self::PayloadTooLarge { declared, limit } => Some(format!(
                "declared {} bytes, limit is {} bytes",
                declared, limit
            )),
            Self::UpstreamTimeout { timeout } => Some(format!(
                "no response within {}ms",
                timeout.as_millis()
            )),
            Self::UpstreamUnreachable(reason) => Some(reason.clone()),
            Self::Internal(reason) => Some(reason.clone()),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Proxy error");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = match self.details() {
            Some(details) => json!({ "error": self.label(), "details": details }),
            None => json!({ "error": self.label() }),
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited {
            retry_after_secs, ..
        } = &self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Response for a panic caught at the router boundary.
pub fn panic_response(payload: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let reason = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    ProxyError::Internal(reason).into_response()
}
