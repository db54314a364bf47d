//! Push channel
//!
//! Each WebSocket connection registers as a broadcast listener and receives
//! every event as a JSON text frame. Inbound text is ignored; the client
//! only listens.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};

use crate::state::AppState;

/// GET /ws
pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| connection(socket, state))
}

async fn connection(mut socket: WebSocket, state: AppState) {
    let mut listener = state.broadcaster().register();
    tracing::info!(listener_id = listener.id, "Push channel connected");

    loop {
        tokio::select! {
            outbound = listener.receiver.recv() => {
                let Some(payload) = outbound else { break };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.broadcaster().unregister(listener.id);
    tracing::info!(listener_id = listener.id, "Push channel disconnected");
}
