//! HTTP listener.

use axum::Router;
use olapgate_config::GatewayConfig;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::bootstrap::build_app;
use crate::error::Result;

/// Build the gateway from `config` and serve it until Ctrl-C.
pub async fn start_server(config: GatewayConfig) -> Result<()> {
    let addr = config.listen_addr()?;
    let app = build_app(&config)?;

    info!("Starting olapgate on http://{}", addr);
    let listener = TcpListener::bind(addr).await?;
    serve(listener, app).await
}

/// Serve `app` on an already bound listener.
///
/// Connection info is attached to every request so user host restrictions
/// can be checked.
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
