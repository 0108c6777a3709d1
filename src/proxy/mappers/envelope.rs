use axum::http::HeaderValue;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::proxy::upstream::UpstreamResponse;

/// Wrapper returned to the client around the upstream's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyResponseEnvelope {
    pub forwarded: bool,
    pub status: u16,
    pub response: Value,
}

/// Decode an upstream body as JSON, wrapping anything else as `{"raw": text}`.
pub fn decode_body(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => json!({ "raw": text }),
    }
}

impl ProxyResponseEnvelope {
    pub fn from_upstream(upstream: &UpstreamResponse) -> Self {
        Self {
            forwarded: true,
            status: upstream.status.as_u16(),
            response: decode_body(&upstream.body),
        }
    }
}

/// Client response mirroring the upstream status, never rewriting it.
///
/// For statuses that forbid a body (204, 304) the envelope is dropped on the
/// wire and the client receives only the status and headers.
pub fn into_client_response(upstream: &UpstreamResponse, request_id: &str) -> Response {
    let envelope = ProxyResponseEnvelope::from_upstream(upstream);
    let mut response = (upstream.status, Json(envelope)).into_response();
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}
