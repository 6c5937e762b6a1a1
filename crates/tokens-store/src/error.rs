//! Error types for relation store access.

use tokens_types::RelationId;

/// Errors returned by [`RelationStore`](crate::RelationStore) writes and
/// [`MemoryStore`](crate::MemoryStore) topology changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The relation instance does not exist (never created or torn down).
    #[error("relation {0} does not exist")]
    UnknownRelation(RelationId),

    /// A unit tried to write a data bag it does not own.
    #[error("unit {unit} cannot write data owned by {owner}")]
    NotOwner {
        /// The bag being written.
        owner: String,
        /// The unit attempting the write.
        unit: String,
    },

    /// The unit is not a participant of the relation instance.
    #[error("unit {unit} is not a member of relation {relation}")]
    NotMember {
        /// The relation instance.
        relation: RelationId,
        /// The unit that is not bound to it.
        unit: String,
    },

    /// A relation instance with this id already exists.
    #[error("relation {0} already exists")]
    DuplicateRelation(RelationId),

    /// Neither side of the relation instance uses this endpoint name.
    #[error("relation {relation} has no side bound to endpoint {endpoint}")]
    UnknownEndpoint {
        /// The relation instance.
        relation: RelationId,
        /// The endpoint that was looked up.
        endpoint: String,
    },
}
