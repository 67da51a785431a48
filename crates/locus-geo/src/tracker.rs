//! Geo-fence membership for many tracked entities sharing one fence.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::evaluator::{evaluate_into, Evaluation, Membership};
use crate::fence::GeoFence;

/// Identifier a transport assigns to a remote device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Something whose position is tracked against the fence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityId {
    /// This device.
    Local,
    /// A remote device reported through the transport.
    Peer(PeerId),
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Local => f.write_str("local device"),
            EntityId::Peer(id) => write!(f, "device {}", id),
        }
    }
}

/// How membership state is partitioned between entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipScope {
    /// Each entity has its own membership state.
    #[default]
    PerEntity,
    /// One state shared by every entity. Interleaved samples from different
    /// entities will flip it back and forth.
    Shared,
}

/// Tracks inside/outside membership per entity against a single fence.
#[derive(Debug, Clone)]
pub struct FenceTracker {
    fence: GeoFence,
    scope: MembershipScope,
    states: HashMap<EntityId, Membership>,
}

impl FenceTracker {
    pub fn new(fence: GeoFence, scope: MembershipScope) -> Self {
        Self {
            fence,
            scope,
            states: HashMap::new(),
        }
    }

    pub fn fence(&self) -> &GeoFence {
        &self.fence
    }

    pub fn scope(&self) -> MembershipScope {
        self.scope
    }

    fn key(&self, entity: &EntityId) -> EntityId {
        match self.scope {
            MembershipScope::PerEntity => entity.clone(),
            MembershipScope::Shared => EntityId::Local,
        }
    }

    /// Evaluate a sample for `entity`, updating that entity's state.
    pub fn evaluate(&mut self, entity: &EntityId, sample: Coordinate) -> Evaluation {
        let key = self.key(entity);
        let state = self.states.entry(key).or_default();
        evaluate_into(&self.fence, state, &sample)
    }

    /// Current membership of `entity` (`Unknown` if never seen).
    pub fn state(&self, entity: &EntityId) -> Membership {
        self.states
            .get(&self.key(entity))
            .copied()
            .unwrap_or_default()
    }

    /// Drop the state kept for `entity`. Returns true if any was kept.
    ///
    /// Under [`MembershipScope::Shared`] only forgetting the local device
    /// clears the shared flag.
    pub fn forget(&mut self, entity: &EntityId) -> bool {
        match (self.scope, entity) {
            (MembershipScope::Shared, EntityId::Peer(_)) => false,
            _ => self.states.remove(entity).is_some(),
        }
    }

    /// Number of entities with recorded state.
    pub fn tracked(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Transition;

    const CENTER: Coordinate = Coordinate::new(28.7041, 77.1025);
    const FAR: Coordinate = Coordinate::new(28.7400, 77.1025);

    fn tracker(scope: MembershipScope) -> FenceTracker {
        FenceTracker::new(GeoFence::new(CENTER, 2000.0).unwrap(), scope)
    }

    fn peer(id: &str) -> EntityId {
        EntityId::Peer(PeerId::new(id))
    }

    #[test]
    fn test_entities_are_tracked_independently() {
        let mut t = tracker(MembershipScope::PerEntity);

        assert!(t.evaluate(&EntityId::Local, CENTER).transitioned);
        assert!(t.evaluate(&peer("a"), FAR).transitioned);

        // Interleaving does not disturb either entity.
        assert!(!t.evaluate(&EntityId::Local, CENTER).transitioned);
        assert!(!t.evaluate(&peer("a"), FAR).transitioned);

        assert_eq!(t.state(&EntityId::Local), Membership::Inside);
        assert_eq!(t.state(&peer("a")), Membership::Outside);
        assert_eq!(t.tracked(), 2);
    }

    #[test]
    fn test_shared_scope_flips_on_interleaving() {
        let mut t = tracker(MembershipScope::Shared);

        assert!(t.evaluate(&EntityId::Local, CENTER).transitioned);
        let remote = t.evaluate(&peer("a"), FAR);
        assert_eq!(remote.transition(), Some(Transition::Exited));
        let local = t.evaluate(&EntityId::Local, CENTER);
        assert_eq!(local.transition(), Some(Transition::Entered));
        assert_eq!(t.tracked(), 1);
    }

    #[test]
    fn test_forget_resets_entity() {
        let mut t = tracker(MembershipScope::PerEntity);
        t.evaluate(&peer("a"), FAR);
        assert!(t.forget(&peer("a")));
        assert!(!t.forget(&peer("a")));
        assert_eq!(t.state(&peer("a")), Membership::Unknown);
        assert!(t.evaluate(&peer("a"), FAR).transitioned);
    }

    #[test]
    fn test_forget_peer_keeps_shared_state() {
        let mut t = tracker(MembershipScope::Shared);
        t.evaluate(&peer("a"), FAR);
        assert!(!t.forget(&peer("a")));
        assert_eq!(t.state(&EntityId::Local), Membership::Outside);
    }

    #[test]
    fn test_unknown_entity_state() {
        let t = tracker(MembershipScope::PerEntity);
        assert_eq!(t.state(&peer("ghost")), Membership::Unknown);
    }

    #[test]
    fn test_entity_display() {
        assert_eq!(EntityId::Local.to_string(), "local device");
        assert_eq!(peer("xyz").to_string(), "device xyz");
    }
}
