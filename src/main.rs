use anyhow::Context;
use murmur::{api, telemetry, AppState, HubConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = HubConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        bind = %config.bind_addr,
        message_capacity = config.message_capacity,
        status_capacity = config.status_capacity,
        status_ttl_secs = config.status_ttl.whole_seconds(),
        reel_capacity = config.reel_capacity,
        static_dir = ?config.static_dir,
        "Starting hub"
    );

    let app = api::app(&config, AppState::new(&config));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "HTTP and WebSocket endpoint ready at /ws");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
