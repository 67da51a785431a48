//! Map rendering interface and an in-memory marker layer.

use std::collections::BTreeMap;

use locus_geo::{Coordinate, GeoFence, PeerId};

pub const FENCE_CENTER_LABEL: &str = "Geo-Fence Center";

/// Visual side of the tracker: markers, the fence overlay, the view.
pub trait MapRenderer: Send {
    /// Recenter the view, optionally changing zoom.
    fn set_view(&mut self, center: Coordinate, zoom: Option<u8>);

    /// Draw the fence circle and its labelled center marker.
    fn draw_fence(&mut self, fence: &GeoFence, label: &str);

    /// Create the peer's marker or move it to `at`.
    fn upsert_marker(&mut self, peer: &PeerId, at: Coordinate);

    /// Remove the peer's marker. Returns false if it had none.
    fn remove_marker(&mut self, peer: &PeerId) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView {
    pub center: Coordinate,
    pub zoom: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FenceOverlay {
    pub fence: GeoFence,
    pub label: String,
}

/// [`MapRenderer`] that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MarkerLayer {
    markers: BTreeMap<PeerId, Coordinate>,
    view: Option<MapView>,
    fence: Option<FenceOverlay>,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self, peer: &PeerId) -> Option<Coordinate> {
        self.markers.get(peer).copied()
    }

    pub fn markers(&self) -> impl Iterator<Item = (&PeerId, &Coordinate)> {
        self.markers.iter()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn view(&self) -> Option<MapView> {
        self.view
    }

    pub fn fence(&self) -> Option<&FenceOverlay> {
        self.fence.as_ref()
    }
}

impl MapRenderer for MarkerLayer {
    fn set_view(&mut self, center: Coordinate, zoom: Option<u8>) {
        // Keep the current zoom when none is given; 0 before anything was set.
        let zoom = zoom.or(self.view.map(|v| v.zoom)).unwrap_or_default();
        self.view = Some(MapView { center, zoom });
    }

    fn draw_fence(&mut self, fence: &GeoFence, label: &str) {
        self.fence = Some(FenceOverlay {
            fence: *fence,
            label: label.to_string(),
        });
    }

    fn upsert_marker(&mut self, peer: &PeerId, at: Coordinate) {
        if self.markers.insert(peer.clone(), at).is_none() {
            tracing::debug!("Added marker for {}", peer);
        }
    }

    fn remove_marker(&mut self, peer: &PeerId) -> bool {
        self.markers.remove(peer).is_some()
    }
}
