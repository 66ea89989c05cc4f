//! WebSocket live-update endpoint.
//!
//! GET /ws
//!
//! Broadcasts `{eventId}` hints on every event state change. The console
//! uses them only as a cue to refresh: no ordering or delivery guarantees,
//! and a slow consumer that lags simply misses hints.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Extension;
use axum::response::Response;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::kernel::StreamHub;
use crate::server::app::AppState;

pub async fn ws_handler(
    Extension(state): Extension<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(mut socket: WebSocket, hub: StreamHub) {
    let mut rx = hub.subscribe();

    loop {
        tokio::select! {
            broadcast = rx.recv() => match broadcast {
                Ok(value) => {
                    if socket.send(Message::Text(value.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    debug!(missed, "websocket consumer lagged behind broadcasts");
                }
                Err(RecvError::Closed) => break,
            },
            // Drain client frames so pings are answered; any close ends the task.
            incoming = socket.recv() => match incoming {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}
