//! WebSocket push endpoint.
//!
//! Each session gets a bounded queue from the hub; frames are forwarded to
//! the socket under the subscriber write timeout. A session that cannot
//! drain in time (or whose hub queue overflows) is closed; the detector is
//! never blocked by a slow client. A heartbeat re-sends the latest frame
//! when the pipe has been quiet, keeping the ≤30 s liveness contract.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use super::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

pub async fn opportunities_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut sub = state.hub.subscribe();
    let write_timeout = state.cfg.subscriber_write_timeout;
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first interval tick fires immediately; the initial frame already
    // comes through the subscription queue.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            frame = sub.rx.recv() => {
                // A closed queue means the hub dropped this subscriber.
                let Some(frame) = frame else { break };
                if send_frame(&mut socket, frame, write_timeout).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let frame = state.hub.latest_frame().unwrap_or_else(|| "[]".to_string());
                if send_frame(&mut socket, frame, write_timeout).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // No client->server protocol; everything else is ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.unsubscribe(sub.id);
    debug!(subscriber = sub.id, "websocket session closed");
}

async fn send_frame(socket: &mut WebSocket, frame: String, write_timeout: Duration) -> Result<(), ()> {
    match timeout(write_timeout, socket.send(Message::Text(frame))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(()),
        Err(_elapsed) => {
            debug!("subscriber write timed out; closing session");
            Err(())
        }
    }
}
