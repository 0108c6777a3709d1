// Upstream client implementation
// Single-attempt forwarding with a cancellable timeout

use reqwest::{header::HeaderMap, Client, StatusCode};
use std::error::Error as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::proxy::error::{ProxyError, Result};
use crate::proxy::upstream::request::OutboundRequest;

const USER_AGENT: &str = concat!("hook-gate/", env!("CARGO_PKG_VERSION"));

/// Raw upstream answer before translation.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

pub struct UpstreamClient {
    http_client: Client,
    in_flight: Arc<AtomicUsize>,
}

/// Counts a call as in flight until dropped.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl UpstreamClient {
    pub fn new() -> std::result::Result<Self, String> {
        let http_client = Client::builder()
            // Connection settings (reuse connections to the single upstream)
            .connect_timeout(Duration::from_secs(20))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .no_proxy()
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            http_client,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Upstream calls currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Forward the request, giving up after `timeout`.
    ///
    /// A watchdog cancels the call's token when the timeout expires. The
    /// in-flight request is dropped, which releases its connection, but the
    /// upstream may still process whatever it already received.
    pub async fn forward(&self, request: OutboundRequest, timeout: Duration) -> Result<UpstreamResponse> {
        // An explicit token rather than `tokio::time::timeout`: `send` takes it so callers can cancel too
        let cancel = CancellationToken::new();
        let watchdog = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
            })
        };

        let outcome = self.send(request, &cancel).await;
        watchdog.abort();

        match outcome {
            Some(result) => result,
            None => {
                tracing::warn!("Upstream call abandoned after {}ms", timeout.as_millis());
                Err(ProxyError::UpstreamTimeout { timeout })
            }
        }
    }

    /// Issue the call unless `cancel` fires first.
    ///
    /// Returns `None` when cancelled; the pending request is dropped before
    /// this returns.
    pub async fn send(
        &self,
        request: OutboundRequest,
        cancel: &CancellationToken,
    ) -> Option<Result<UpstreamResponse>> {
        let _guard = InFlightGuard::new(&self.in_flight);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.dispatch(request) => Some(result),
        }
    }

    async fn dispatch(&self, request: OutboundRequest) -> Result<UpstreamResponse> {
        let OutboundRequest {
            method,
            url,
            headers,
            body,
        } = request;

        tracing::debug!("Forwarding {} to upstream {}", method, url.host_str().unwrap_or("?"));

        let mut builder = self.http_client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(unreachable)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(unreachable)?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Transport failures, with the underlying cause chain flattened.
/// The URL is stripped first; in query mode it carries the credential.
fn unreachable(err: reqwest::Error) -> ProxyError {
    let err = err.without_url();
    let mut reason = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    ProxyError::UpstreamUnreachable(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use url::Url;

    fn request_to(url: &str) -> OutboundRequest {
        OutboundRequest {
            method: Method::GET,
            url: Url::parse(url).unwrap(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Accepts connections and never answers.
    async fn silent_listener() -> (tokio::net::TcpListener, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        // bind then drop to get a port nobody listens on
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let client = UpstreamClient::new().unwrap();
        let result = client
            .forward(
                request_to(&format!("http://127.0.0.1:{}/", port)),
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(ProxyError::UpstreamUnreachable(_))));
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_timeout_cancels_and_releases() {
        let (listener, url) = silent_listener().await;
        let accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(socket);
        });

        let client = UpstreamClient::new().unwrap();
        let result = client.forward(request_to(&url), Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ProxyError::UpstreamTimeout { .. })));
        assert_eq!(client.in_flight(), 0);
        accept.abort();
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_call() {
        let client = UpstreamClient::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = client.send(request_to("http://127.0.0.1:9/"), &cancel).await;
        assert!(outcome.is_none());
        assert_eq!(client.in_flight(), 0);
    }
}
