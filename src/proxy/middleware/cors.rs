//! CORS handling and preflight short-circuit.
//!
//! The policy is coarse and demo-grade: an origin is allowed
//! when the configured list holds `*` or that exact origin string. There is
//! no pattern matching, no credentials mode and no per-route policy.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::proxy::server::AppState;

pub const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
pub const ALLOWED_HEADERS: &str = "Content-Type, Authorization, X-Proxy-Secret";
const PREFLIGHT_MAX_AGE: &str = "86400";

/// Origin to echo in `Access-Control-Allow-Origin`, or `None` to omit it.
pub fn resolve_cors_origin(origin: Option<&str>, allowed: &[String]) -> Option<String> {
    let wildcard = allowed.iter().any(|o| o.trim() == "*");
    match origin {
        Some(origin) if wildcard || allowed.iter().any(|o| o.trim() == origin) => {
            Some(origin.to_string())
        }
        None if wildcard => Some("*".to_string()),
        _ => None,
    }
}

fn request_origin(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::ORIGIN).and_then(|v| v.to_str().ok())
}

fn apply_origin(headers: &mut HeaderMap, origin: Option<&str>) {
    if let Some(value) = origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }
}

/// Bodyless 204 announcing the allowed methods, headers and origin.
pub fn preflight_response(origin: Option<&str>) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    apply_origin(headers, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE),
    );
    response
}

/// Answers preflight requests before routing and decorates every other
/// response with the resolved origin.
///
/// Preflight never reaches the gate: no config, secret or size checks apply.
pub async fn cors_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = resolve_cors_origin(
        request_origin(request.headers()),
        &state.config.allowed_origins,
    );

    if request.method() == Method::OPTIONS {
        tracing::debug!(origin = ?origin, "Answering CORS preflight");
        return preflight_response(origin.as_deref());
    }

    let mut response = next.run(request).await;
    apply_origin(response.headers_mut(), origin.as_deref());
    response
}
