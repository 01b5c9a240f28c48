//! WebSocket channel exposing the sentiment service to browser clients.
//!
//! Each connection gets its own event subscription; fan-out happens over
//! the service's broadcast channel, so a connection that closes or errors
//! simply drops out of the set. Stopping the analyzer is always an
//! explicit client command — a disconnect never stops it.

use crate::sentiment::process::{SentimentEvent, SentimentService};
use crate::sentiment::SentimentSample;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Wire protocol
// ---------------------------------------------------------------------------

/// Messages sent from a browser client to the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start the analyzer, optionally selecting a camera.
    Start {
        #[serde(rename = "cameraIndex", default)]
        camera_index: Option<u32>,
    },
    /// Stop the analyzer.
    Stop,
}

/// Messages pushed from the server to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A new validated sentiment sample.
    Sentiment { data: SentimentSample },
    /// Current running state of the analyzer.
    Status { data: StatusData },
}

/// Payload of a status message.
#[derive(Debug, Clone, Serialize)]
pub struct StatusData {
    pub running: bool,
}

impl ServerMessage {
    fn status(running: bool) -> Self {
        Self::Status {
            data: StatusData { running },
        }
    }

    fn to_ws(&self) -> Message {
        // Serialization of these closed enums cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        Message::Text(json.into())
    }
}

// ---------------------------------------------------------------------------
// Connection handler
// ---------------------------------------------------------------------------

/// Serve one WebSocket connection until it closes.
///
/// On connect the client immediately receives the current sample (if any)
/// and the running status. Afterwards it receives every broadcast event,
/// and may send start/stop commands which are acknowledged with a status
/// push. Malformed inbound messages are logged and ignored.
pub async fn serve_connection(socket: WebSocket, service: Arc<SentimentService>) {
    let (mut tx, mut rx) = socket.split();
    let mut events = service.subscribe();

    debug!("client connected to sentiment stream");

    if let Some(current) = service.current() {
        let message = ServerMessage::Sentiment { data: current };
        if tx.send(message.to_ws()).await.is_err() {
            return;
        }
    }
    if tx
        .send(ServerMessage::status(service.is_running()).to_ws())
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let outbound = match event {
                    Ok(SentimentEvent::Sample(sample)) => {
                        Some(ServerMessage::Sentiment { data: sample })
                    }
                    Ok(SentimentEvent::Started) => Some(ServerMessage::status(true)),
                    Ok(SentimentEvent::Stopped { .. }) => Some(ServerMessage::status(false)),
                    Ok(SentimentEvent::Error(_)) => None,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "sentiment subscriber lagged");
                        None
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                if let Some(message) = outbound {
                    if tx.send(message.to_ws()).await.is_err() {
                        break;
                    }
                }
            }
            inbound = rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&text, &service) {
                            if tx.send(reply.to_ws()).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Binary and ping/pong frames ignored.
                    Some(Err(e)) => {
                        debug!(error = %e, "sentiment stream socket error");
                        break;
                    }
                }
            }
        }
    }

    debug!("client disconnected from sentiment stream");
}

/// Apply one inbound command, returning the status acknowledgment to send
/// back to the requesting client.
fn handle_client_message(text: &str, service: &Arc<SentimentService>) -> Option<ServerMessage> {
    let parsed: ClientMessage = match serde_json::from_str(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            // Malformed commands never close the connection.
            warn!(error = %e, "ignoring malformed sentiment channel message");
            return None;
        }
    };

    match parsed {
        ClientMessage::Start { camera_index } => {
            let index = camera_index.unwrap_or(service_default_camera(service));
            if let Err(e) = service.start(index) {
                warn!(error = %e, "sentiment start over websocket failed");
            }
            Some(ServerMessage::status(service.is_running()))
        }
        ClientMessage::Stop => {
            service.stop();
            Some(ServerMessage::status(false))
        }
    }
}

fn service_default_camera(service: &Arc<SentimentService>) -> u32 {
    service.default_camera_index()
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn client_messages_parse_wire_shapes() {
        let start: ClientMessage =
            serde_json::from_str(r#"{"type":"start","cameraIndex":2}"#).unwrap();
        assert!(matches!(
            start,
            ClientMessage::Start {
                camera_index: Some(2)
            }
        ));

        let bare_start: ClientMessage = serde_json::from_str(r#"{"type":"start"}"#).unwrap();
        assert!(matches!(
            bare_start,
            ClientMessage::Start { camera_index: None }
        ));

        let stop: ClientMessage = serde_json::from_str(r#"{"type":"stop"}"#).unwrap();
        assert!(matches!(stop, ClientMessage::Stop));
    }

    #[test]
    fn server_messages_serialize_wire_shapes() {
        let status = serde_json::to_value(ServerMessage::status(true)).unwrap();
        assert_eq!(status["type"], "status");
        assert_eq!(status["data"]["running"], true);

        let sample = SentimentSample {
            value: -1,
            timestamp: 1700000000000,
            confidence: None,
        };
        let message = serde_json::to_value(ServerMessage::Sentiment { data: sample }).unwrap();
        assert_eq!(message["type"], "sentiment");
        assert_eq!(message["data"]["value"], -1);
        assert!(message["data"].get("confidence").is_none());
    }
}
