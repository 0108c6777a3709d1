use hook_gate::modules;
use hook_gate::proxy;

#[tokio::main]
async fn main() -> Result<(), String> {
    let log_dir = modules::config::load_log_dir();
    let _log_guard = modules::logger::init_logger(log_dir.as_deref());

    let proxy_config = modules::config::load_proxy_config()
        .map_err(|e| format!("failed to load configuration: {}", e))?;

    tracing::debug!("loaded configuration: {:?}", proxy_config);

    let (server, handle) = proxy::AxumServer::start(proxy_config)
        .await
        .map_err(|e| format!("failed to start proxy server: {}", e))?;

    tracing::info!("hook-gate listening on http://{}", server.local_addr());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for shutdown signal: {}", e))?;

    tracing::info!("shutdown requested, stopping server...");
    server.stop();
    let _ = handle.await;

    Ok(())
}
