//! Live WebSocket feed
//!
//! Each client receives a `live` frame with the latest row of every series
//! on a fixed interval. Text frames of the form `{"event": ..., "data": ...}`
//! sent by any client are relayed to every connected client.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::AppState;

/// Frame exchanged over the socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl LiveEvent {
    pub const LIVE: &'static str = "live";
    pub const ERROR: &'static str = "error";
}

/// Fan-out of client events to every connected socket
#[derive(Debug, Clone)]
pub struct LiveHub {
    sender: broadcast::Sender<String>,
}

impl LiveHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Validate and fan out a client frame; returns the number of receivers
    pub fn relay(&self, text: &str) -> Result<usize, serde_json::Error> {
        let event: LiveEvent = serde_json::from_str(text)?;
        let frame = serde_json::to_string(&event)?;
        // No subscribers is not an error for a relay
        Ok(self.sender.send(frame).unwrap_or(0))
    }

    pub fn client_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Upgrade to a WebSocket
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn live_frame(state: &AppState) -> String {
    let event = match state.aggregator.live_snapshot().await {
        Ok(snapshot) => LiveEvent {
            event: LiveEvent::LIVE.to_string(),
            data: serde_json::to_value(snapshot).unwrap_or(Value::Null),
        },
        Err(e) => {
            warn!("Live snapshot failed: {}", e);
            LiveEvent {
                event: LiveEvent::ERROR.to_string(),
                data: Value::from("Failed to fetch live data"),
            }
        }
    };
    serde_json::to_string(&event).unwrap_or_default()
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut relayed = state.hub.subscribe();
    let mut ticker = tokio::time::interval(state.live_interval);

    info!("Client connected ({} total)", state.hub.client_count());
    metrics::gauge!("ws_clients").increment(1.0);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = live_frame(&state).await;
                if socket.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            frame = relayed.recv() => match frame {
                Ok(frame) => {
                    if socket.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Client lagging, {} relayed events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => match state.hub.relay(&text) {
                    Ok(receivers) => debug!("Relayed client event to {} clients", receivers),
                    Err(e) => warn!("Ignoring malformed client event: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
            },
        }
    }

    metrics::gauge!("ws_clients").decrement(1.0);
    info!("Client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_relay_reaches_subscribers() {
        let hub = LiveHub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        let sent = hub
            .relay(r#"{"event":"bike_added","data":{"name":"Bike Rack"}}"#)
            .unwrap();
        assert_eq!(sent, 2);

        for rx in [&mut first, &mut second] {
            let frame = rx.recv().await.unwrap();
            let event: LiveEvent = serde_json::from_str(&frame).unwrap();
            assert_eq!(event.event, "bike_added");
            assert_eq!(event.data["name"], "Bike Rack");
        }
    }

    #[test]
    fn test_relay_rejects_malformed() {
        let hub = LiveHub::new(8);
        assert!(hub.relay("not json").is_err());
        assert!(hub.relay(r#"{"data":1}"#).is_err());
    }

    #[test]
    fn test_relay_without_clients() {
        let hub = LiveHub::new(8);
        assert_eq!(hub.relay(r#"{"event":"ping"}"#).unwrap(), 0);
        assert_eq!(hub.client_count(), 0);
    }
}
