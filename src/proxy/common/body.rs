use axum::body::Body;
use axum::http::Method;

/// Payload substituted when the inbound body is empty or unreadable.
pub const DEFAULT_BODY: &str = "{}";

/// Hard cap on buffered inbound bodies (100 MiB), independent of the
/// declared-length payload ceiling.
pub const MAX_BUFFERED_BODY: usize = 100 * 1024 * 1024;

/// Methods whose body is read and forwarded.
pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Read the inbound body as text for payload methods.
///
/// Returns `None` for methods without payload semantics (nothing is read).
/// A failed or empty read yields [`DEFAULT_BODY`] so forwarding proceeds.
pub async fn read_body(method: &Method, body: Body, limit: usize) -> Option<String> {
    if !carries_body(method) {
        return None;
    }

    let text = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!("Failed to read request body, using default payload: {}", e);
            return Some(DEFAULT_BODY.to_string());
        }
    };

    if text.is_empty() {
        Some(DEFAULT_BODY.to_string())
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A body whose stream fails part way through.
    fn failing_body() -> Body {
        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![
            Ok("partial"),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
        ];
        Body::from_stream(futures::stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_bodyless_methods_skip_read() {
        for method in [Method::GET, Method::DELETE, Method::HEAD] {
            let result = read_body(&method, Body::from("ignored"), MAX_BUFFERED_BODY).await;
            assert!(result.is_none(), "{} should not read a body", method);
        }
    }

    #[tokio::test]
    async fn test_payload_methods_read_text() {
        for method in [Method::POST, Method::PUT, Method::PATCH] {
            let result = read_body(&method, Body::from(r#"{"a":1}"#), MAX_BUFFERED_BODY).await;
            assert_eq!(result.as_deref(), Some(r#"{"a":1}"#));
        }
    }

    #[tokio::test]
    async fn test_empty_body_defaults() {
        let result = read_body(&Method::POST, Body::empty(), MAX_BUFFERED_BODY).await;
        assert_eq!(result.as_deref(), Some(DEFAULT_BODY));
    }

    #[tokio::test]
    async fn test_over_cap_read_defaults() {
        let result = read_body(&Method::POST, Body::from("0123456789"), 4).await;
        assert_eq!(result.as_deref(), Some(DEFAULT_BODY));
    }

    #[tokio::test]
    async fn test_failed_stream_defaults() {
        let result = read_body(&Method::PUT, failing_body(), MAX_BUFFERED_BODY).await;
        assert_eq!(result.as_deref(), Some(DEFAULT_BODY));
    }
}
