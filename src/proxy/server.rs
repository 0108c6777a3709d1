use crate::proxy::config::ProxyConfig;
use crate::proxy::error::panic_response;
use crate::proxy::rate_limit::RateLimiter;
use crate::proxy::upstream::UpstreamClient;
use axum::{
    extract::{ConnectInfo, State},
    response::{IntoResponse, Json, Response},
    routing::{any, get},
    Extension, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Path of the debug echo route, mounted only when enabled.
pub const DEBUG_ECHO_PATH: &str = "/__debug/echo";

/// Axum application state
#[derive(Clone)]
pub struct AppState {
    /// Read-only for the process lifetime
    pub config: Arc<ProxyConfig>,
    pub rate_limiter: Arc<RateLimiter>,
    pub upstream: Arc<UpstreamClient>,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Result<Self, String> {
        let rate_limiter = RateLimiter::new(config.rate_limit_max, config.rate_limit_window());
        Ok(Self {
            config: Arc::new(config),
            rate_limiter: Arc::new(rate_limiter),
            upstream: Arc::new(UpstreamClient::new()?),
        })
    }
}

/// Build the proxy router.
///
/// Layer order, outermost first: panic catcher, request tracing, CORS
/// (answers preflight), then the gate on proxy routes only.
pub fn build_router(state: AppState) -> Router {
    use crate::proxy::handlers;
    use crate::proxy::middleware;

    let mut gated = Router::new()
        .route("/", any(handlers::forward::handle_forward))
        .route("/*path", any(handlers::forward::handle_forward));
    if state.config.debug_echo {
        tracing::warn!("Debug echo route enabled at {}", DEBUG_ECHO_PATH);
        gated = gated.route(DEBUG_ECHO_PATH, any(handlers::debug::handle_echo));
    }
    let gated = gated.route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/healthz", get(health_check_handler))
        .merge(gated)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::cors_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// Axum server instance
pub struct AxumServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
    local_addr: SocketAddr,
    state: AppState,
}

impl AxumServer {
    /// Start Axum server
    pub async fn start(config: ProxyConfig) -> Result<(Self, tokio::task::JoinHandle<()>), String> {
        if let Err(e) = config.validate() {
            tracing::warn!("{}; every proxy request will fail until this is fixed", e);
        }

        let state = AppState::new(config)?;
        let app = build_router(state.clone());

        // Bind address
        let addr = SocketAddr::new(state.config.bind_addr, state.config.port);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| format!("Failed to bind address {}: {}", addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| format!("Failed to read local address: {}", e))?;

        tracing::info!("Proxy server started at http://{}", local_addr);

        // Create shutdown channel
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let maintenance = spawn_counter_maintenance(Arc::clone(&state.rate_limiter));

        // Start server in a new task
        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;
            use hyper_util::service::TowerToHyperService;

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, peer)) => {
                                let io = TokioIo::new(stream);
                                // Peer address feeds the rate-limit key fallback
                                let service = TowerToHyperService::new(
                                    app.clone().layer(Extension(ConnectInfo(peer))),
                                );

                                tokio::task::spawn(async move {
                                    if let Err(err) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("Connection handling ended or error: {:?}", err);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {:?}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("Proxy server stopped listening");
                        break;
                    }
                }
            }

            maintenance.abort();
        });

        Ok((
            Self {
                shutdown_tx: Some(shutdown_tx),
                local_addr,
                state,
            },
            handle,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Stop the server
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Periodically drop counters whose window has elapsed.
fn spawn_counter_maintenance(limiter: Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    let period = limiter.window().max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            limiter.purge_expired();
        }
    })
}

/// Health check handler
///
/// Reports the same configuration failure as the gate, so an unconfigured
/// proxy is never reported healthy.
async fn health_check_handler(State(state): State<AppState>) -> crate::proxy::error::Result<Response> {
    state.config.validate()?;
    Ok(Json(serde_json::json!({
        "status": "ok"
    }))
    .into_response())
}
