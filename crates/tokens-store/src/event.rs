//! Relation lifecycle notifications delivered by the external dispatcher.

use tokens_types::RelationId;

/// The event that triggered an evaluation.
///
/// Only teardown carries meaning for the protocol: during a
/// [`RelationEvent::Broken`] notification the instance may still be listed
/// by the store, but must already be treated as gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationEvent {
    /// A remote unit joined the relation instance.
    Joined(RelationId),
    /// Relation data in the instance changed.
    Changed(RelationId),
    /// A remote unit left the relation instance.
    Departed(RelationId),
    /// The relation instance is being torn down.
    Broken(RelationId),
    /// Any event not tied to a relation instance (install, config change, ...).
    Other,
}

impl RelationEvent {
    /// Returns the relation instance the event concerns, if any.
    pub fn relation(self) -> Option<RelationId> {
        match self {
            Self::Joined(id) | Self::Changed(id) | Self::Departed(id) | Self::Broken(id) => {
                Some(id)
            }
            Self::Other => None,
        }
    }

    /// Returns `true` if this is the teardown notification for `relation`.
    pub fn is_broken(self, relation: RelationId) -> bool {
        matches!(self, Self::Broken(id) if id == relation)
    }
}
