// Forward handler - the admitted half of the pipeline
use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderValue,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::Instrument;

use crate::proxy::audit;
use crate::proxy::common::body::{read_body, MAX_BUFFERED_BODY};
use crate::proxy::error::Result;
use crate::proxy::mappers::into_client_response;
use crate::proxy::server::AppState;
use crate::proxy::upstream::{build_outbound, UpstreamResponse};

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Read the body, build the outbound call, forward it once and wrap the answer.
///
/// Runs behind the gate; every request reaching here is configured,
/// authenticated, within the declared size and within its rate limit.
/// Success and failure responses both carry `x-request-id`.
pub async fn handle_forward(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("forward", request_id = %request_id);

    async move {
        let method = request.method().clone();
        let started = Instant::now();

        match forward(&state, request).await {
            Ok(upstream) => {
                audit::log_forwarded(
                    &request_id,
                    method.as_str(),
                    upstream.status.as_u16(),
                    started.elapsed().as_millis(),
                );
                into_client_response(&upstream, &request_id)
            }
            Err(err) => {
                audit::log_forward_failed(
                    &request_id,
                    method.as_str(),
                    err.status().as_u16(),
                    err.label(),
                    started.elapsed().as_millis(),
                );
                let mut response = err.into_response();
                if let Ok(value) = HeaderValue::from_str(&request_id) {
                    response.headers_mut().insert(REQUEST_ID_HEADER, value);
                }
                response
            }
        }
    }
    .instrument(span)
    .await
}

async fn forward(state: &AppState, request: Request<Body>) -> Result<UpstreamResponse> {
    let (parts, body) = request.into_parts();

    let payload = read_body(&parts.method, body, MAX_BUFFERED_BODY).await;
    let outbound = build_outbound(
        &state.config,
        parts.method,
        &parts.headers,
        parts.uri.query(),
        payload,
    )?;

    state
        .upstream
        .forward(outbound, state.config.forward_timeout())
        .await
}
