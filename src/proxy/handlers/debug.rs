//! Debug echo endpoint.
//!
//! Reports what the proxy received without contacting the upstream. Mounted
//! only when `debug_echo` is enabled, still behind CORS and the gate. Header
//! values are never echoed, only their names.

use axum::{
    body::Body,
    extract::Request,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::proxy::common::body::MAX_BUFFERED_BODY;

pub async fn handle_echo(request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let query: Vec<(String, String)> = parts
        .uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let mut header_names: Vec<&str> = parts.headers.keys().map(|k| k.as_str()).collect();
    header_names.sort_unstable();
    header_names.dedup();

    let body_bytes = match axum::body::to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => Some(bytes.len()),
        Err(e) => {
            tracing::debug!("Debug echo could not read body: {}", e);
            None
        }
    };

    Json(json!({
        "forwarded": false,
        "echo": {
            "method": parts.method.as_str(),
            "path": parts.uri.path(),
            "query": query,
            "headers": header_names,
            "body_bytes": body_bytes,
        }
    }))
    .into_response()
}
