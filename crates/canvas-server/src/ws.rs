use crate::routes::AppState;
use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, ConnectInfo, State},
    response::IntoResponse,
};
use canvas_core::Subscription;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tracing::{debug, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket, remote))
}

/// Viewer connections are receive-only: the hub queue is drained into the
/// socket, inbound frames are ignored until the peer closes.
async fn handle_socket(state: AppState, socket: WebSocket, remote: SocketAddr) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let Subscription {
        conn_id,
        mut receiver,
    } = state.store.subscribe().await;
    info!(event = "viewer_connected", conn_id = %conn_id, remote = %remote);

    let write_timeout = state.write_timeout;
    let writer_conn = conn_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            let send = ws_sender.send(Message::Text(message.to_string()));
            match tokio::time::timeout(write_timeout, send).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(event = "write_error", conn_id = %writer_conn, error = %err);
                    return;
                }
                Err(_) => {
                    warn!(event = "write_timeout", conn_id = %writer_conn);
                    return;
                }
            }
        }
        // The hub dropped this subscriber; let the peer reconnect for a fresh replay.
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    let reason = loop {
        tokio::select! {
            _ = &mut write_task => break "writer_closed",
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break "client_close",
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    warn!(event = "read_error", conn_id = %conn_id, error = %err);
                    break "read_error";
                }
            },
        }
    };

    state.store.unsubscribe(&conn_id);
    write_task.abort();
    info!(event = "viewer_disconnected", conn_id = %conn_id, reason = reason);
}
