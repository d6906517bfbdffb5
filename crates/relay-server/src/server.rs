//! Listeners and top-level server wiring.
//!
//! This module:
//! - Builds the shared `Relay` and spawns the lifecycle task.
//! - Serves the HTTP API + WebSocket transport with axum.
//! - Accepts raw TCP line connections (if enabled), assigning each a
//!   connection slot and spawning a per-client task.
//!
//! The per-client logic lives in `client` (TCP) and `ws` (WebSocket);
//! open/close ordering lives in `lifecycle_task`.

use std::sync::Arc;

use anyhow::{Context, Result};
use relay_core::{Relay, SystemClock};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::client;
use crate::config::Config;
use crate::http;
use crate::lifecycle_task;
use crate::types::{AppState, ConnectionTracker};

/// Build the shared state. Must be called inside a Tokio runtime (spawns
/// the lifecycle task).
pub fn build_state(config: Config) -> Result<AppState> {
    let groups = config.group_directory()?;
    let relay = Arc::new(Relay::with_parts(config.relay_config(), groups, Arc::new(SystemClock)));
    let lifecycle = lifecycle_task::spawn(relay.clone());

    Ok(AppState {
        relay,
        lifecycle,
        connections: Arc::new(ConnectionTracker::new(config.max_connections)),
        config: Arc::new(config),
    })
}

/// Run the server with the given configuration.
pub async fn run(config: Config) -> Result<()> {
    let http_addr = config.http_addr_string();
    let http_listener = TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("binding HTTP listener on {}", http_addr))?;

    let tcp_listener = match config.tcp_addr_string() {
        Some(addr) => Some(
            TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding TCP listener on {}", addr))?,
        ),
        None => None,
    };

    let state = build_state(config)?;
    serve(state, http_listener, tcp_listener).await
}

/// Serve on already-bound listeners until one of them fails.
pub async fn serve(state: AppState, http_listener: TcpListener, tcp_listener: Option<TcpListener>) -> Result<()> {
    info!(addr = %http_listener.local_addr()?, "HTTP/WebSocket listening");
    let app = http::router(state.clone());
    let http_server = async { axum::serve(http_listener, app).await.context("HTTP server") };

    match tcp_listener {
        Some(listener) => {
            tokio::try_join!(http_server, run_line_listener(listener, state))?;
            Ok(())
        }
        None => http_server.await,
    }
}

/// Accept loop for the raw TCP line transport.
pub async fn run_line_listener(listener: TcpListener, state: AppState) -> Result<()> {
    info!(addr = %listener.local_addr()?, "TCP line transport listening");

    loop {
        let (stream, peer_addr) = listener.accept().await?;

        let Some(slot) = state.connections.try_acquire() else {
            warn!(
                %peer_addr,
                max_connections = state.config.max_connections,
                "rejecting connection: max_connections reached"
            );
            // Just drop the stream; client will see connection closed.
            continue;
        };

        let connection = slot.id();
        info!(%connection, %peer_addr, "accepted line connection");

        let state = state.clone();
        tokio::spawn(async move {
            match client::run_client(slot, stream, state).await {
                Ok(()) => debug!(%connection, "line client disconnected"),
                Err(e) => warn!(%connection, error = %e, "line client error"),
            }
        });
    }
}
