//! WebSocket connection lifecycle for relay clients.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tracing::{debug, info, warn};

use super::{Delivery, RelayHub, error_frame};
use crate::http::AppState;

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay))
}

async fn handle_socket(socket: WebSocket, hub: RelayHub) {
    let mut subscription = hub.join();
    let id = subscription.id();
    let (mut sink, mut stream) = socket.split();
    info!(%id, clients = hub.subscribers(), "relay client connected");

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Err(err) = hub.publish(id, &text) {
                        debug!(%id, error = %err, "frame refused");
                        if send_text(&mut sink, error_frame(&err.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(%id, error = %err, "relay receive error");
                    break;
                }
            },
            outbound = subscription.recv() => match outbound {
                Delivery::Frame(frame) => {
                    if send_text(&mut sink, frame.to_string()).await.is_err() {
                        break;
                    }
                }
                Delivery::Lagged(skipped) => {
                    warn!(%id, skipped, "relay client lagged");
                    let notice = error_frame(&format!("lagged: {skipped} frames dropped"));
                    if send_text(&mut sink, notice).await.is_err() {
                        break;
                    }
                }
                Delivery::Closed => break,
            },
        }
    }

    info!(%id, "relay client disconnected");
}

async fn send_text(sink: &mut SplitSink<WebSocket, Message>, text: String) -> Result<(), axum::Error> {
    sink.send(Message::Text(text)).await
}
