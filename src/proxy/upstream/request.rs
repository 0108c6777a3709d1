//! Outbound request construction.
//!
//! Only the content type and a proxy marker header travel upstream. The
//! inbound secret and every other client header are dropped here.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::proxy::config::{CredentialMode, ProxyConfig};
use crate::proxy::error::{ProxyError, Result};

/// Marker identifying requests that came through the proxy.
pub const FORWARDED_BY_HEADER: &str = "x-forwarded-by";
pub const FORWARDED_BY_VALUE: &str = "hook-gate";

/// Content type assumed when the client sends none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// A fully built upstream call.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// `None` for methods without payload semantics
    pub body: Option<String>,
}

/// Append the inbound query parameters (and a query-mode credential) to the
/// upstream base URL.
///
/// Parameters are appended, never merged: a name already present on the
/// base URL ends up duplicated.
pub fn build_upstream_url(
    base: &str,
    inbound_query: Option<&str>,
    query_credential: Option<(&str, &str)>,
) -> Result<Url> {
    let mut url = Url::parse(base.trim())
        .map_err(|e| ProxyError::Configuration(format!("invalid upstream URL: {}", e)))?;

    let inbound: Vec<(String, String)> = inbound_query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    if !inbound.is_empty() || query_credential.is_some() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &inbound {
            pairs.append_pair(name, value);
        }
        if let Some((name, value)) = query_credential {
            pairs.append_pair(name, value);
        }
    }

    Ok(url)
}

/// Allow-listed outbound headers plus a header-mode credential.
pub fn build_headers(inbound: &HeaderMap, header_credential: Option<(&str, &str)>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    let content_type = inbound
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        FORWARDED_BY_HEADER,
        HeaderValue::from_static(FORWARDED_BY_VALUE),
    );

    if let Some((name, value)) = header_credential {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ProxyError::Configuration(format!("invalid credential header name: {}", e))
        })?;
        let mut value = HeaderValue::from_str(value).map_err(|_| {
            ProxyError::Configuration("credential is not a valid header value".to_string())
        })?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Build the upstream call for an admitted request.
pub fn build_outbound(
    config: &ProxyConfig,
    method: Method,
    inbound_headers: &HeaderMap,
    inbound_query: Option<&str>,
    body: Option<String>,
) -> Result<OutboundRequest> {
    let credential = config.active_credential();
    let (header_credential, query_credential) = match (credential, config.credential_mode) {
        (None, _) => (None, None),
        (Some(c), CredentialMode::Header) => (Some((config.credential_header.as_str(), c)), None),
        (Some(c), CredentialMode::QueryParam) => (None, Some((config.credential_param.as_str(), c))),
    };

    let url = build_upstream_url(&config.upstream_url, inbound_query, query_credential)?;
    let headers = build_headers(inbound_headers, header_credential)?;

    Ok(OutboundRequest {
        method,
        url,
        headers,
        body,
    })
}
