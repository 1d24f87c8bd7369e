use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::EventKind;
use crate::state::AppState;

/// GET /ws - upgrade and join the broadcast.
pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(state.connection_buffer);

    if let Err(err) = state.hub.register(connection_id, tx) {
        warn!(connection_id = %connection_id, error = %err, "could not register connection");
        return;
    }

    // Ends when the hub drops our sender (unregister or eviction) or the
    // socket stops accepting writes.
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(err) = ws_tx.send(message).await {
                debug!(connection_id = %connection_id, error = %err, "websocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
        let _ = ws_tx.close().await;
        debug!(connection_id = %connection_id, "writer task finished");
    });

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Text(text)) => {
                state.publish(EventKind::Text, text);
            }
            Ok(Message::Binary(data)) => {
                debug!(connection_id = %connection_id, bytes = data.len(), "ignoring binary frame");
            }
            Ok(Message::Close(frame)) => {
                info!(
                    connection_id = %connection_id,
                    reason = ?frame.map(|f| f.reason.to_string()),
                    "client closed websocket"
                );
                break;
            }
            Ok(_) => continue,
            Err(err) => {
                warn!(connection_id = %connection_id, error = %err, "error receiving message");
                break;
            }
        }
    }

    let _ = state.hub.unregister(connection_id);
    debug!(connection_id = %connection_id, "reader finished");
}
