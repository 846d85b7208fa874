//! WebSocket feed for crash rounds
//!
//! Forwards the round engine's broadcast events to each connected client.
//! One producer, many observers; a slow client misses ticks instead of
//! stalling the round clock.

use super::handlers::AppState;
use crate::games::crash::RoundEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};

/// GET /ws/crash
pub async fn crash_feed_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let events = state.crash.subscribe();
    ws.on_upgrade(move |socket| stream_rounds(socket, events))
}

async fn stream_rounds(socket: WebSocket, events: broadcast::Receiver<RoundEvent>) {
    let (mut sink, mut incoming) = socket.split();
    let mut events = BroadcastStream::new(events);
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("round event serialization failed: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                    debug!(missed, "slow crash feed subscriber dropped ticks");
                }
                None => break,
            },
            message = incoming.next() => match message {
                // Clients only listen; drain pings and drop on close.
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
