#![forbid(unsafe_code)]

use std::{net::SocketAddr, sync::Arc};

use roi_adapter::{build_router, build_runtime, init_tracing, AdapterConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = AdapterConfig::from_env();
    let addr: SocketAddr = config.bind.parse()?;

    let runtime = Arc::new(build_runtime(&config));
    let app = build_router(runtime.clone());

    tracing::info!(
        %addr,
        store = %runtime.history().describe(),
        detector_configured = runtime.detector_configured(),
        "roi_adapter_http listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
