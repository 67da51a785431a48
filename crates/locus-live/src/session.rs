//! Live tracking session.
//!
//! Owns the fence tracker and serialises every local and remote sample
//! through one loop, so membership state needs no lock. Weather lookups run
//! in a `JoinSet` owned by the loop; only the newest request is allowed to
//! update the widget. A lookup task that panics or is aborted counts as a
//! failed lookup.

use std::collections::HashMap;
use std::sync::Arc;

use locus_core::{Config, PositionError, TransportError};
use locus_geo::{
    Coordinate, EntityId, Evaluation, FenceError, FenceTracker, GeoFence, MembershipScope,
    PeerId, Transition,
};
use locus_weather::{WeatherError, WeatherReport, WeatherWidget};
use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::map::{MapRenderer, FENCE_CENTER_LABEL};
use crate::position::PositionUpdate;
use crate::subscription::Subscription;
use crate::transport::{RemoteEvent, TransportChannel};
use crate::weather::WeatherLookup;

/// Things a session reports to whoever is presenting it.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// An entity entered or left the fence (or was seen for the first time).
    Transition {
        entity: EntityId,
        transition: Transition,
        at: Coordinate,
        distance_meters: f64,
    },
    /// A remote device is outside the fence.
    Alert { peer: PeerId, message: String },
    PeerLeft(PeerId),
    PositionFailed(PositionError),
    PublishFailed(TransportError),
    WeatherUpdated(WeatherWidget),
}

#[derive(Debug)]
struct WeatherDone {
    seq: u64,
    result: Result<WeatherReport, WeatherError>,
}

pub fn exit_alert(peer: &PeerId) -> String {
    format!("Device {} has exited the Geo-Fence!", peer)
}

pub struct LiveSession<M, T, W> {
    tracker: FenceTracker,
    map: M,
    transport: T,
    weather: Option<Arc<W>>,
    widget: WeatherWidget,
    weather_seq: u64,
    applied_seq: u64,
    lookups: JoinSet<WeatherDone>,
    pending: HashMap<Id, u64>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<M, T, W> LiveSession<M, T, W>
where
    M: MapRenderer,
    T: TransportChannel,
    W: WeatherLookup,
{
    /// Start a session: centers the map on the fence and draws it.
    pub fn new(
        fence: GeoFence,
        scope: MembershipScope,
        initial_zoom: u8,
        mut map: M,
        transport: T,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        map.set_view(fence.center(), Some(initial_zoom));
        map.draw_fence(&fence, FENCE_CENTER_LABEL);

        let (events, events_rx) = mpsc::unbounded_channel();

        tracing::info!(
            "Tracking {} against a {} m fence at {}",
            transport.peer_id(),
            fence.radius_meters(),
            fence.center()
        );

        let session = Self {
            tracker: FenceTracker::new(fence, scope),
            map,
            transport,
            weather: None,
            widget: WeatherWidget::Unavailable,
            weather_seq: 0,
            applied_seq: 0,
            lookups: JoinSet::new(),
            pending: HashMap::new(),
            events,
        };
        (session, events_rx)
    }

    pub fn from_config(
        config: &Config,
        map: M,
        transport: T,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), FenceError> {
        let fence = config.fence.to_fence()?;
        Ok(Self::new(
            fence,
            config.fence.scope,
            config.map.initial_zoom,
            map,
            transport,
        ))
    }

    pub fn with_weather(mut self, weather: W) -> Self {
        self.weather = Some(Arc::new(weather));
        self
    }

    pub fn tracker(&self) -> &FenceTracker {
        &self.tracker
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn widget(&self) -> &WeatherWidget {
        &self.widget
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine; the session keeps running.
        let _ = self.events.send(event);
    }

    fn emit_transition(&self, entity: &EntityId, at: Coordinate, evaluation: &Evaluation) {
        if let Some(transition) = evaluation.transition() {
            self.emit(SessionEvent::Transition {
                entity: entity.clone(),
                transition,
                at,
                distance_meters: evaluation.distance_meters,
            });
        }
    }

    /// Handle one update from the local position source.
    pub async fn handle_local(&mut self, update: PositionUpdate) -> Option<Evaluation> {
        let at = match update {
            Ok(at) => at,
            Err(e) => {
                tracing::error!("Position update failed: {}", e);
                self.emit(SessionEvent::PositionFailed(e));
                return None;
            }
        };

        if let Err(e) = self.transport.publish(at).await {
            tracing::warn!("Failed to publish location: {}", e);
            self.emit(SessionEvent::PublishFailed(e));
        }

        self.request_weather(at);

        let evaluation = self.tracker.evaluate(&EntityId::Local, at);
        match evaluation.transition() {
            Some(Transition::Entered) => tracing::info!("Device entered the Geo-Fence"),
            Some(Transition::Exited) => tracing::info!("Device exited the Geo-Fence"),
            None => {}
        }
        self.emit_transition(&EntityId::Local, at, &evaluation);

        Some(evaluation)
    }

    /// Handle a location or disconnect notice from the transport.
    pub fn handle_remote(&mut self, event: RemoteEvent) -> Option<Evaluation> {
        match event {
            RemoteEvent::Location { peer, at } => {
                let entity = EntityId::Peer(peer.clone());
                let evaluation = self.tracker.evaluate(&entity, at);

                self.map.set_view(at, None);
                self.map.upsert_marker(&peer, at);
                self.request_weather(at);

                self.emit_transition(&entity, at, &evaluation);
                if evaluation.transition() == Some(Transition::Exited) {
                    let message = exit_alert(&peer);
                    tracing::warn!("{}", message);
                    self.emit(SessionEvent::Alert { peer, message });
                }

                Some(evaluation)
            }
            RemoteEvent::Disconnected(peer) => {
                let had_marker = self.map.remove_marker(&peer);
                self.tracker.forget(&EntityId::Peer(peer.clone()));
                tracing::info!("Peer {} left (marker removed: {})", peer, had_marker);
                self.emit(SessionEvent::PeerLeft(peer));
                None
            }
        }
    }

    fn request_weather(&mut self, at: Coordinate) {
        let Some(weather) = self.weather.clone() else {
            return;
        };

        self.weather_seq += 1;
        let seq = self.weather_seq;

        let handle = self.lookups.spawn(async move {
            let result = weather.lookup(at).await;
            WeatherDone { seq, result }
        });
        self.pending.insert(handle.id(), seq);
    }

    /// Number of weather lookups still running.
    pub fn weather_in_flight(&self) -> usize {
        self.lookups.len()
    }

    fn finish_lookup(&mut self, joined: Result<WeatherDone, JoinError>) {
        match joined {
            Ok(done) => {
                self.pending.retain(|_, seq| *seq != done.seq);
                self.apply_weather(done);
            }
            Err(e) => {
                let Some(seq) = self.pending.remove(&e.id()) else {
                    tracing::warn!("Unknown weather lookup ended: {}", e);
                    return;
                };
                tracing::error!("Weather lookup #{} did not complete: {}", seq, e);
                self.apply_weather(WeatherDone {
                    seq,
                    result: Err(WeatherError::Aborted(e.to_string())),
                });
            }
        }
    }

    fn apply_weather(&mut self, done: WeatherDone) {
        if done.seq <= self.applied_seq {
            tracing::debug!("Discarding stale weather response #{}", done.seq);
            return;
        }
        self.applied_seq = done.seq;

        if let Err(e) = &done.result {
            tracing::error!("Error fetching weather data: {}", e);
        }
        self.widget = WeatherWidget::from_result(&done.result);
        self.emit(SessionEvent::WeatherUpdated(self.widget.clone()));
    }

    /// Wait for every outstanding weather lookup to land.
    pub async fn settle_weather(&mut self) {
        while let Some(joined) = self.lookups.join_next().await {
            self.finish_lookup(joined);
        }
    }

    /// Drive the session until `shutdown` fires or the local position
    /// stream ends. Outstanding weather lookups are awaited before a
    /// position-stream end returns. The session is handed back for
    /// inspection.
    pub async fn run(
        mut self,
        mut positions: Subscription<PositionUpdate>,
        mut remote: Subscription<RemoteEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        let mut positions_open = true;
        let mut remote_open = true;

        loop {
            if !positions_open && self.lookups.is_empty() {
                tracing::info!("Position stream ended, stopping session");
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("Session shutdown requested");
                    break;
                }
                Some(joined) = self.lookups.join_next() => self.finish_lookup(joined),
                update = positions.recv(), if positions_open => match update {
                    Some(update) => {
                        self.handle_local(update).await;
                    }
                    None => positions_open = false,
                },
                event = remote.recv(), if remote_open => match event {
                    Some(event) => {
                        self.handle_remote(event);
                    }
                    None => {
                        tracing::warn!("Transport subscription closed");
                        remote_open = false;
                    }
                },
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::LocalHub;
    use crate::map::MarkerLayer;
    use locus_geo::Membership;

    struct NoWeather;

    impl WeatherLookup for NoWeather {
        async fn lookup(&self, _at: Coordinate) -> Result<WeatherReport, WeatherError> {
            Err(WeatherError::InvalidApiKey)
        }
    }

    const CENTER: Coordinate = Coordinate::new(28.7041, 77.1025);
    const FAR: Coordinate = Coordinate::new(28.7400, 77.1025);

    fn session(
        hub: &LocalHub,
    ) -> (
        LiveSession<MarkerLayer, crate::hub::HubConnection, NoWeather>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let fence = GeoFence::new(CENTER, 2000.0).unwrap();
        LiveSession::new(
            fence,
            MembershipScope::PerEntity,
            14,
            MarkerLayer::new(),
            hub.connect_as(PeerId::new("me")),
        )
    }

    #[tokio::test]
    async fn test_new_session_draws_fence() {
        let hub = LocalHub::new(8);
        let (session, _events) = session(&hub);

        let view = session.map().view().unwrap();
        assert_eq!(view.center, CENTER);
        assert_eq!(view.zoom, 14);
        assert_eq!(session.map().fence().unwrap().label, FENCE_CENTER_LABEL);
    }

    #[tokio::test]
    async fn test_local_transitions_are_edge_triggered() {
        let hub = LocalHub::new(8);
        let (mut session, mut events) = session(&hub);

        assert!(session.handle_local(Ok(CENTER)).await.unwrap().transitioned);
        assert!(!session.handle_local(Ok(CENTER)).await.unwrap().transitioned);
        assert!(session.handle_local(Ok(FAR)).await.unwrap().transitioned);

        let first = events.recv().await.unwrap();
        assert!(matches!(
            first,
            SessionEvent::Transition {
                entity: EntityId::Local,
                transition: Transition::Entered,
                ..
            }
        ));
        let second = events.recv().await.unwrap();
        assert!(matches!(
            second,
            SessionEvent::Transition {
                transition: Transition::Exited,
                ..
            }
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_position_error_is_reported() {
        let hub = LocalHub::new(8);
        let (mut session, mut events) = session(&hub);

        assert!(session.handle_local(Err(PositionError::Timeout)).await.is_none());
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::PositionFailed(PositionError::Timeout))
        );
    }

    #[tokio::test]
    async fn test_remote_exit_raises_one_alert() {
        let hub = LocalHub::new(8);
        let (mut session, mut events) = session(&hub);
        let peer = PeerId::new("p1");

        for _ in 0..3 {
            session.handle_remote(RemoteEvent::Location {
                peer: peer.clone(),
                at: FAR,
            });
        }

        assert_eq!(session.map().marker(&peer), Some(FAR));
        assert_eq!(session.map().view().unwrap().center, FAR);
        assert_eq!(session.map().view().unwrap().zoom, 14);

        let mut alerts = 0;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Alert { message, .. } = event {
                assert_eq!(message, "Device p1 has exited the Geo-Fence!");
                alerts += 1;
            }
        }
        assert_eq!(alerts, 1);
    }

    #[tokio::test]
    async fn test_disconnect_removes_marker_and_state() {
        let hub = LocalHub::new(8);
        let (mut session, mut events) = session(&hub);
        let peer = PeerId::new("p1");

        session.handle_remote(RemoteEvent::Location {
            peer: peer.clone(),
            at: CENTER,
        });
        session.handle_remote(RemoteEvent::Disconnected(peer.clone()));

        assert_eq!(session.map().marker(&peer), None);
        assert_eq!(
            session.tracker().state(&EntityId::Peer(peer.clone())),
            Membership::Unknown
        );

        let last = std::iter::from_fn(|| events.try_recv().ok()).last();
        assert_eq!(last, Some(SessionEvent::PeerLeft(peer)));
    }

    #[tokio::test]
    async fn test_failed_weather_shows_unavailable() {
        let hub = LocalHub::new(8);
        let (session, mut events) = session(&hub);
        let mut session = session.with_weather(NoWeather);

        session.handle_local(Ok(CENTER)).await;
        session.settle_weather().await;

        assert_eq!(session.widget(), &WeatherWidget::Unavailable);
        let updated = std::iter::from_fn(|| events.try_recv().ok())
            .any(|e| e == SessionEvent::WeatherUpdated(WeatherWidget::Unavailable));
        assert!(updated);
    }
}
