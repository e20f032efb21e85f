//! HTTP and WebSocket surface for delivered readings.
//!
//! Exposes the latest value, the session's liveness, the display unit
//! selector, and a WebSocket stream of every delivered value.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod websocket;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;
pub use state::AppState;

use crate::error::{Result, StreamError};
use crate::pipeline::SessionState;
use crate::reading::{ConvertedValue, UnitControl};
use futures_util::stream::BoxStream;
use std::net::SocketAddr;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::{debug, info};

/// Start the web server, publishing every value from `readings`.
///
/// `units` is the control the `/api/unit` endpoint writes to and `session`
/// reports whether values are still live.
pub async fn start_web_server(
    config: WebConfig,
    mut readings: BoxStream<'static, ConvertedValue>,
    units: UnitControl,
    session: watch::Receiver<SessionState>,
) -> Result<()> {
    let state = AppState::new(
        units,
        session,
        config.broadcast_capacity,
        config.max_websocket_connections,
    );
    let app = create_app(&config, state.clone());

    // Parse the bind address
    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| StreamError::config_error(format!("Invalid bind address: {}", e)))?;

    info!("Starting thermolog web server on http://{}", addr);
    info!("API endpoint: http://{}/api/reading", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| StreamError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    let _publish_task = tokio::spawn(async move {
        while let Some(value) = readings.next().await {
            state.publish(value);
        }
        debug!("Reading stream ended");
    });

    axum::serve(listener, app)
        .await
        .map_err(|e| StreamError::web_server_error(format!("Server error: {}", e)))?;

    Ok(())
}
