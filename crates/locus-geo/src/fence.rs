use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::error::FenceError;

/// Circular geo-fence: a center coordinate and a radius in meters.
///
/// Immutable once built. The boundary is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFence")]
pub struct GeoFence {
    center: Coordinate,
    radius_meters: f64,
}

#[derive(Deserialize)]
struct RawFence {
    center: Coordinate,
    radius_meters: f64,
}

impl TryFrom<RawFence> for GeoFence {
    type Error = FenceError;

    fn try_from(raw: RawFence) -> Result<Self, Self::Error> {
        GeoFence::new(raw.center, raw.radius_meters)
    }
}

impl GeoFence {
    /// Build a fence. The radius must be finite and non-negative.
    pub fn new(center: Coordinate, radius_meters: f64) -> Result<Self, FenceError> {
        if !radius_meters.is_finite() || radius_meters < 0.0 {
            return Err(FenceError::InvalidRadius(radius_meters));
        }

        Ok(Self {
            center,
            radius_meters,
        })
    }

    pub fn center(&self) -> Coordinate {
        self.center
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    /// Distance from the fence center to `sample`, in meters.
    pub fn distance_from_center(&self, sample: &Coordinate) -> f64 {
        self.center.distance_to(sample)
    }

    /// Whether a precomputed distance falls inside the fence.
    ///
    /// NaN compares false, so non-finite samples land outside.
    pub fn contains_distance(&self, distance_meters: f64) -> bool {
        distance_meters <= self.radius_meters
    }

    pub fn contains(&self, sample: &Coordinate) -> bool {
        self.contains_distance(self.distance_from_center(sample))
    }
}
