// File: src/api/realtime.rs

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info};

use crate::api::AppState;
use crate::eventbus::ChatEvent;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Forwards bus events to one client until either side goes away or the
/// bus drops it for falling behind. Dropping the receiver is what removes
/// this client from the bus.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut events = state.event_bus.subscribe(None).await;
    let mut shutdown_rx = state.event_bus.shutdown_rx.clone();
    let (mut sink, mut stream) = socket.split();
    info!("Websocket client connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                // the bus drops clients that fall behind
                let Some(event) = event else {
                    info!("Websocket client dropped by the event bus");
                    break;
                };
                // system messages stay server-side
                if matches!(event, ChatEvent::SystemMessage(_)) {
                    continue;
                }
                let frame = event.to_json().to_string();
                if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => debug!("Ignoring client frame"),
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
    info!("Websocket client disconnected");
}
