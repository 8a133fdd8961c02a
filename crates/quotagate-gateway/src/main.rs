//! quotaGate standalone gateway.
//!
//! - Every request outside `/_gateway/*` is intercepted by the quota filter
//! - Admitted requests are forwarded to `gateway.upstream`
//! - Policy calls go to the named cluster from `clusters`
//! - Ctrl-C drains: readyz flips to 503, in-flight requests finish

use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

use quotagate_core::error::{QuotaGateError, Result};
use quotagate_gateway::{app_state, config, router};

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "quotagate.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg.gateway.listen.parse().map_err(|e| {
        QuotaGateError::BadConfig(format!("gateway.listen must be a valid SocketAddr: {e}"))
    })?;

    let state = app_state::AppState::new(cfg)?;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, config = %path, "quotagate-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| QuotaGateError::Internal(format!("failed to bind {listen}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .map_err(|e| QuotaGateError::Internal(format!("server failed: {e}")))?;

    tracing::info!("quotagate-gateway stopped");
    Ok(())
}

async fn shutdown_signal(state: app_state::AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    state.set_draining();
    tracing::info!("shutdown requested; draining");
}
