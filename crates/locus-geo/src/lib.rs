//! Geo primitives for Locus
//!
//! Coordinates, great-circle distance, circular geo-fences and the
//! membership tracking that turns a stream of samples into enter/exit
//! transitions.

pub mod coordinate;
pub mod error;
pub mod evaluator;
pub mod fence;
pub mod tracker;

pub use coordinate::{haversine_distance, Coordinate, EARTH_RADIUS_METERS};
pub use error::FenceError;
pub use evaluator::{Evaluation, GeoFenceEvaluator, Membership, Transition};
pub use fence::GeoFence;
pub use tracker::{EntityId, FenceTracker, MembershipScope, PeerId};
