//! Real-time transport interface and its JSON message frames.
//!
//! Frames mirror the tracking server's socket events:
//! `send-location` from a client, `receive-location` and
//! `user-disconnected` from the server.

use std::future::Future;

use locus_core::TransportError;
use locus_geo::{Coordinate, PeerId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::subscription::Subscription;

/// Frames a client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    SendLocation(Coordinate),
}

/// Frames the server broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    ReceiveLocation {
        id: PeerId,
        latitude: f64,
        longitude: f64,
    },
    UserDisconnected(PeerId),
}

impl From<ServerMessage> for RemoteEvent {
    fn from(message: ServerMessage) -> Self {
        match message {
            ServerMessage::ReceiveLocation {
                id,
                latitude,
                longitude,
            } => RemoteEvent::Location {
                peer: id,
                at: Coordinate::new(latitude, longitude),
            },
            ServerMessage::UserDisconnected(id) => RemoteEvent::Disconnected(id),
        }
    }
}

pub fn encode<M: Serialize>(message: &M) -> Result<String, TransportError> {
    serde_json::to_string(message).map_err(|e| TransportError::Encode(e.to_string()))
}

pub fn decode<M: DeserializeOwned>(frame: &str) -> Result<M, TransportError> {
    serde_json::from_str(frame).map_err(|e| TransportError::Decode(e.to_string()))
}

/// What a subscriber hears about other devices.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    Location { peer: PeerId, at: Coordinate },
    Disconnected(PeerId),
}

/// Duplex publish/subscribe channel shared with other devices.
pub trait TransportChannel: Send {
    /// Identifier other devices see for this connection.
    fn peer_id(&self) -> &PeerId;

    /// Broadcast this device's position.
    fn publish(&self, at: Coordinate) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Subscribe to remote positions and disconnect notices.
    /// Must be called inside a tokio runtime.
    fn subscribe(&self) -> Subscription<RemoteEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_location_frame() {
        let frame = encode(&ClientMessage::SendLocation(Coordinate::new(28.7, 77.1))).unwrap();
        assert_eq!(
            frame,
            r#"{"event":"send-location","data":{"latitude":28.7,"longitude":77.1}}"#
        );
    }

    #[test]
    fn test_receive_location_frame() {
        let message: ServerMessage = decode(
            r#"{"event":"receive-location","data":{"id":"abc","latitude":1.0,"longitude":2.0}}"#,
        )
        .unwrap();

        assert_eq!(
            RemoteEvent::from(message),
            RemoteEvent::Location {
                peer: PeerId::new("abc"),
                at: Coordinate::new(1.0, 2.0),
            }
        );
    }

    #[test]
    fn test_user_disconnected_frame() {
        let frame = encode(&ServerMessage::UserDisconnected(PeerId::new("abc"))).unwrap();
        assert_eq!(frame, r#"{"event":"user-disconnected","data":"abc"}"#);

        let message: ServerMessage = decode(&frame).unwrap();
        assert_eq!(
            RemoteEvent::from(message),
            RemoteEvent::Disconnected(PeerId::new("abc"))
        );
    }

    #[test]
    fn test_unknown_event_is_decode_error() {
        let result = decode::<ServerMessage>(r#"{"event":"chat","data":"hi"}"#);
        assert!(matches!(result, Err(TransportError::Decode(_))));
    }
}
