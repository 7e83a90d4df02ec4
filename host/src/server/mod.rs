use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::error::HostError;
use crate::AppState;

pub mod api;

/// Starts the notarization server.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from_str(&state.opts.address)
        .map_err(|_| HostError::InvalidAddress(state.opts.address.clone()))?;
    let listener = TcpListener::bind(addr).await?;

    info!("Listening on: {}", listener.local_addr()?);

    let router = api::create_router(state.opts.concurrency_limit).with_state(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server couldn't serve")?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
