//! Edge-triggered geo-fence membership.
//!
//! The evaluator classifies each sample as inside or outside its fence and
//! reports whether the classification changed since the previous sample.
//! Membership starts as [`Membership::Unknown`], so the very first sample
//! always counts as a transition.

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::fence::GeoFence;

/// Last observed classification of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    #[default]
    Unknown,
    Inside,
    Outside,
}

impl Membership {
    pub fn from_inside(inside: bool) -> Self {
        if inside {
            Self::Inside
        } else {
            Self::Outside
        }
    }

    /// `None` while no sample has been observed.
    pub fn is_inside(self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Inside => Some(true),
            Self::Outside => Some(false),
        }
    }
}

/// Direction of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Entered,
    Exited,
}

/// Result of evaluating one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub inside: bool,
    pub transitioned: bool,
    pub distance_meters: f64,
}

impl Evaluation {
    /// The transition this evaluation represents, if any.
    pub fn transition(&self) -> Option<Transition> {
        match (self.transitioned, self.inside) {
            (false, _) => None,
            (true, true) => Some(Transition::Entered),
            (true, false) => Some(Transition::Exited),
        }
    }
}

/// Classify `sample` against `fence` and fold the result into `state`.
pub(crate) fn evaluate_into(
    fence: &GeoFence,
    state: &mut Membership,
    sample: &Coordinate,
) -> Evaluation {
    let distance_meters = fence.distance_from_center(sample);
    let inside = fence.contains_distance(distance_meters);
    let next = Membership::from_inside(inside);
    let transitioned = *state != next;

    if transitioned {
        *state = next;
    }

    Evaluation {
        inside,
        transitioned,
        distance_meters,
    }
}

/// Single-entity geo-fence evaluator.
#[derive(Debug, Clone)]
pub struct GeoFenceEvaluator {
    fence: GeoFence,
    state: Membership,
}

impl GeoFenceEvaluator {
    pub fn new(fence: GeoFence) -> Self {
        Self {
            fence,
            state: Membership::Unknown,
        }
    }

    pub fn evaluate(&mut self, sample: Coordinate) -> Evaluation {
        let evaluation = evaluate_into(&self.fence, &mut self.state, &sample);
        if !sample.is_finite() {
            tracing::debug!("Non-finite sample ({}) classified as outside", sample);
        }
        evaluation
    }

    pub fn fence(&self) -> &GeoFence {
        &self.fence
    }

    pub fn state(&self) -> Membership {
        self.state
    }

    /// Forget the last observation; the next sample transitions again.
    pub fn reset(&mut self) {
        self.state = Membership::Unknown;
    }
}
