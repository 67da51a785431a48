//! In-process relay with the behavior of the tracking server.
//!
//! Every `send-location` frame is rebroadcast to all connections (the sender
//! included) as `receive-location` tagged with the sender's id. Closing a
//! connection broadcasts `user-disconnected`.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use locus_core::{TransportConfig, TransportError};
use locus_geo::{Coordinate, PeerId};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::subscription::{subscription, Subscription};
use crate::transport::{decode, encode, ClientMessage, RemoteEvent, ServerMessage, TransportChannel};

#[derive(Debug)]
struct HubInner {
    frames: broadcast::Sender<String>,
    peers: Mutex<BTreeSet<PeerId>>,
    capacity: usize,
}

/// Shared relay; clones refer to the same hub.
#[derive(Debug, Clone)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

impl LocalHub {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (frames, _) = broadcast::channel(capacity);

        Self {
            inner: Arc::new(HubInner {
                frames,
                peers: Mutex::new(BTreeSet::new()),
                capacity,
            }),
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    /// Open a connection with a fresh random id.
    pub fn connect(&self) -> HubConnection {
        self.connect_as(PeerId::new(uuid::Uuid::new_v4().simple().to_string()))
    }

    pub fn connect_as(&self, id: PeerId) -> HubConnection {
        tracing::info!("Peer {} connected", id);
        self.inner.peers.lock().insert(id.clone());

        HubConnection {
            id,
            hub: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// Currently connected peers, sorted.
    pub fn peers(&self) -> Vec<PeerId> {
        self.inner.peers.lock().iter().cloned().collect()
    }

    fn broadcast(&self, message: &ServerMessage) -> Result<(), TransportError> {
        let frame = encode(message)?;
        // No subscribers is not an error: nobody is listening yet.
        if self.inner.frames.send(frame).is_err() {
            tracing::debug!("Dropped frame, no subscribers");
        }
        Ok(())
    }

    fn relay(&self, from: &PeerId, frame: &str) -> Result<(), TransportError> {
        match decode::<ClientMessage>(frame)? {
            ClientMessage::SendLocation(at) => self.broadcast(&ServerMessage::ReceiveLocation {
                id: from.clone(),
                latitude: at.latitude,
                longitude: at.longitude,
            }),
        }
    }

    fn disconnect(&self, id: &PeerId) {
        if self.inner.peers.lock().remove(id) {
            tracing::info!("Peer {} disconnected", id);
            if let Err(e) = self.broadcast(&ServerMessage::UserDisconnected(id.clone())) {
                tracing::warn!("Failed to announce disconnect of {}: {}", id, e);
            }
        }
    }
}

/// One client's connection to a [`LocalHub`]. Disconnects on drop.
#[derive(Debug)]
pub struct HubConnection {
    id: PeerId,
    hub: LocalHub,
    closed: AtomicBool,
}

impl HubConnection {
    pub fn disconnect(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.hub.disconnect(&self.id);
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn send_location(&self, at: Coordinate) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        let frame = encode(&ClientMessage::SendLocation(at))?;
        self.hub.relay(&self.id, &frame)
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl TransportChannel for HubConnection {
    fn peer_id(&self) -> &PeerId {
        &self.id
    }

    fn publish(&self, at: Coordinate) -> impl Future<Output = Result<(), TransportError>> + Send {
        let result = self.send_location(at);
        async move { result }
    }

    fn subscribe(&self) -> Subscription<RemoteEvent> {
        let mut frames = self.hub.inner.frames.subscribe();
        let (feed, sub) = subscription(self.hub.inner.capacity);
        let me = self.id.clone();

        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = feed.cancelled() => break,
                    frame = frames.recv() => frame,
                };

                match frame {
                    Ok(frame) => match decode::<ServerMessage>(&frame) {
                        Ok(message) => {
                            if !feed.send(message.into()).await {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("Peer {} dropped bad frame: {}", me, e),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Peer {} lagged, skipped {} frames", me, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Subscription for {} ended", me);
        });

        sub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_location_is_relayed_to_everyone() {
        let hub = LocalHub::new(16);
        let alice = hub.connect_as(PeerId::new("alice"));
        let bob = hub.connect_as(PeerId::new("bob"));

        let mut alice_events = alice.subscribe();
        let mut bob_events = bob.subscribe();

        alice.publish(Coordinate::new(28.7, 77.1)).await.unwrap();

        let expected = RemoteEvent::Location {
            peer: PeerId::new("alice"),
            at: Coordinate::new(28.7, 77.1),
        };
        assert_eq!(bob_events.recv().await, Some(expected.clone()));
        assert_eq!(alice_events.recv().await, Some(expected));
    }

    #[tokio::test]
    async fn test_disconnect_is_announced() {
        let hub = LocalHub::new(16);
        let watcher = hub.connect_as(PeerId::new("watcher"));
        let mut events = watcher.subscribe();

        let leaver = hub.connect_as(PeerId::new("leaver"));
        assert_eq!(hub.peers().len(), 2);
        drop(leaver);

        assert_eq!(
            events.recv().await,
            Some(RemoteEvent::Disconnected(PeerId::new("leaver")))
        );
        assert_eq!(hub.peers(), vec![PeerId::new("watcher")]);
    }

    #[tokio::test]
    async fn test_publish_after_disconnect_fails() {
        let hub = LocalHub::new(4);
        let conn = hub.connect();
        conn.disconnect();
        assert!(!conn.is_connected());
        assert_eq!(
            conn.publish(Coordinate::new(0.0, 0.0)).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let hub = LocalHub::new(4);
        let conn = hub.connect();
        assert!(conn.publish(Coordinate::new(0.0, 0.0)).await.is_ok());
    }

    #[test]
    fn test_random_ids_are_distinct() {
        let hub = LocalHub::new(4);
        let a = hub.connect();
        let b = hub.connect();
        assert_ne!(a.peer_id(), b.peer_id());
    }
}
